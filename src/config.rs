use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// On-disk pipeline configuration. Sections other than `dataset` are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub dataset: DatasetConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatasetConfig {
    pub products_path: Option<PathBuf>,
    pub queries_path: Option<PathBuf>,
    pub max_samples: Option<usize>,
    #[serde(rename = "max_W", alias = "max_features")]
    pub max_features: Option<usize>,
}

/// Settings for one build after merging the config file with CLI flags.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSettings {
    pub catalog_path: PathBuf,
    pub queries_path: PathBuf,
    pub max_samples: Option<usize>,
    pub max_features: Option<usize>,
}

pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

/// CLI values win over file values; paths must come from one of the two.
pub fn resolve_dataset_settings(
    file: Option<&DatasetConfig>,
    catalog_path: Option<PathBuf>,
    queries_path: Option<PathBuf>,
    max_samples: Option<usize>,
    max_features: Option<usize>,
) -> Result<DatasetSettings> {
    let fallback = DatasetConfig::default();
    let file = file.unwrap_or(&fallback);

    let catalog_path = catalog_path
        .or_else(|| file.products_path.clone())
        .context("catalog path not set: pass --catalog-path or dataset.products_path in --config")?;
    let queries_path = queries_path
        .or_else(|| file.queries_path.clone())
        .context("query log path not set: pass --queries-path or dataset.queries_path in --config")?;

    Ok(DatasetSettings {
        catalog_path,
        queries_path,
        max_samples: max_samples.or(file.max_samples),
        max_features: max_features.or(file.max_features),
    })
}
