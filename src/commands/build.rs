use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::BuildArgs;
use crate::commands::catalog::{self, CATEGORY_MANIFEST_FILE};
use crate::config::{DatasetSettings, load_config, resolve_dataset_settings};
use crate::dataset::matrix::{MatrixBuilder, SequenceDataset};
use crate::dataset::queries::{QueryRow, read_queries};
use crate::dataset::report::write_rephrase_log;
use crate::dataset::{PreparedSessions, prepare};
use crate::model::{BuildCounts, BuildPaths, BuildRunManifest, SourceFile, TensorShapes};
use crate::util::{
    ensure_directory, now_utc_string, open_buffered, sha256_file, utc_compact_string,
    write_json_pretty,
};
use crate::vectorizer::CountVectorizer;

pub const REPHRASE_LOG_FILE: &str = "rephrase_queries.txt";
pub const BUILD_MANIFEST_PREFIX: &str = "build_run_";

/// In-memory result of one build: the tensor pair plus everything needed to
/// interpret it.
#[derive(Debug)]
pub struct BuildOutput {
    pub prepared: PreparedSessions,
    pub dataset: SequenceDataset,
    pub product_count: usize,
    pub warnings: Vec<String>,
}

pub fn run(args: BuildArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let clock = Instant::now();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let file_config = match &args.config {
        Some(path) => Some(load_config(path)?),
        None => None,
    };
    let settings = resolve_dataset_settings(
        file_config.as_ref().map(|config| &config.dataset),
        args.catalog_path.clone(),
        args.queries_path.clone(),
        args.max_samples,
        args.max_features,
    )?;

    configure_threads(args.threads)?;

    let manifest_dir = args.output_dir.join("manifests");
    ensure_directory(&manifest_dir)?;

    info!(
        run_id = %run_id,
        catalog = %settings.catalog_path.display(),
        queries = %settings.queries_path.display(),
        "starting build"
    );

    let output = build_dataset(&settings)?;

    let rephrase_log_path = if args.skip_rephrase_log {
        None
    } else {
        let path = args.output_dir.join(REPHRASE_LOG_FILE);
        let written = write_rephrase_log_file(&path, &output.prepared)?;
        info!(path = %path.display(), sessions = written, "wrote rephrase log");
        Some(path)
    };

    let category_manifest = catalog::build_manifest(
        &settings.catalog_path,
        output.product_count,
        &output.prepared.registry,
    )?;
    write_json_pretty(&manifest_dir.join(CATEGORY_MANIFEST_FILE), &category_manifest)?;

    let manifest_path = manifest_dir.join(format!(
        "{BUILD_MANIFEST_PREFIX}{}.json",
        utc_compact_string(started_ts)
    ));
    let manifest = BuildRunManifest {
        manifest_version: 1,
        run_id,
        status: "completed".to_string(),
        started_at,
        finished_at: now_utc_string(),
        duration_ms: clock.elapsed().as_millis(),
        command: render_build_command(&args),
        paths: BuildPaths {
            output_dir: args.output_dir.display().to_string(),
            rephrase_log_path: rephrase_log_path.map(|path| path.display().to_string()),
            manifest_path: manifest_path.display().to_string(),
        },
        sources: vec![
            source_file(&settings.catalog_path)?,
            source_file(&settings.queries_path)?,
        ],
        max_samples: settings.max_samples,
        counts: build_counts(&output),
        shapes: tensor_shapes(&output.dataset, settings.max_features),
        categories: output.prepared.registry.entries(),
        vocabulary: output.dataset.vocabulary.clone(),
        warnings: output.warnings.clone(),
    };

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote build run manifest");
    info!(
        sessions = manifest.counts.sessions_kept,
        features = ?manifest.shapes.features,
        labels = ?manifest.shapes.labels,
        "build completed"
    );

    Ok(())
}

/// Loads both inputs, normalizes every session and builds the padded tensor pair.
pub fn build_dataset(settings: &DatasetSettings) -> Result<BuildOutput> {
    let products = catalog::load_catalog(&settings.catalog_path)?;
    let rows = load_queries(&settings.queries_path, settings.max_samples)?;

    let prepared = prepare(&products, rows).context("failed to normalize sessions")?;
    let stats = prepared.normalize;
    info!(
        sessions = stats.sessions,
        rephrase_spans = stats.rephrase_spans,
        sessions_with_rephrase = stats.sessions_with_rephrase,
        unresolved = stats.unresolved_sessions,
        resolved = stats.resolved_sessions,
        "normalized sessions"
    );

    let mut warnings = Vec::new();
    if prepared.assembly.missing_product_clicks > 0 {
        let warning = format!(
            "{} clicked rows reference products missing from the catalog",
            prepared.assembly.missing_product_clicks
        );
        warn!(warning = %warning, "catalog coverage warning");
        warnings.push(warning);
    }
    if stats.out_of_order_sessions > 0 {
        let warning = format!(
            "{} sessions have events out of timestamp order; spans were detected in arrival order",
            stats.out_of_order_sessions
        );
        warn!(warning = %warning, "session ordering warning");
        warnings.push(warning);
    }

    let vectorizer = CountVectorizer::new(settings.max_features)?;
    let dataset = MatrixBuilder::new(&prepared.registry, vectorizer)
        .build(&prepared.sessions)
        .context("failed to build sequence matrices")?;

    Ok(BuildOutput {
        prepared,
        dataset,
        product_count: products.len(),
        warnings,
    })
}

fn load_queries(path: &Path, max_samples: Option<usize>) -> Result<Vec<QueryRow>> {
    let reader = open_buffered(path)?;
    let rows = read_queries(reader, &path.display().to_string(), max_samples)
        .with_context(|| format!("failed to load query log {}", path.display()))?;

    info!(path = %path.display(), rows = rows.len(), "loaded query log");
    Ok(rows)
}

fn configure_threads(threads: usize) -> Result<()> {
    if threads == 0 {
        return Ok(());
    }

    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("failed to configure normalization thread pool")
}

fn write_rephrase_log_file(path: &Path, prepared: &PreparedSessions) -> Result<usize> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let written = write_rephrase_log(&mut writer, &prepared.sessions)
        .with_context(|| format!("failed to write {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(written)
}

fn source_file(path: &Path) -> Result<SourceFile> {
    Ok(SourceFile {
        path: path.display().to_string(),
        sha256: sha256_file(path)?,
    })
}

fn tensor_shapes(dataset: &SequenceDataset, max_features: Option<usize>) -> TensorShapes {
    let shape = dataset.shape();
    TensorShapes {
        features: [shape.sessions, shape.target_len, shape.vocabulary_size],
        labels: [shape.sessions, shape.target_len, shape.label_width],
        target_len: shape.target_len,
        vocabulary_size: shape.vocabulary_size,
        max_features,
        padding_rows: dataset.padding_rows(),
    }
}

fn build_counts(output: &BuildOutput) -> BuildCounts {
    let assembly = output.prepared.assembly;
    let stats = output.prepared.normalize;
    BuildCounts {
        catalog_products: output.product_count,
        categories: output.prepared.registry.real_count(),
        query_rows: assembly.rows,
        clicked_rows: assembly.clicked_rows,
        missing_product_clicks: assembly.missing_product_clicks,
        sessions_total: stats.sessions,
        sessions_with_rephrase: stats.sessions_with_rephrase,
        rephrase_spans: stats.rephrase_spans,
        sessions_unresolved: stats.unresolved_sessions,
        sessions_kept: output.dataset.session_ids.len(),
        sessions_out_of_order: stats.out_of_order_sessions,
    }
}

fn render_build_command(args: &BuildArgs) -> String {
    let mut command = vec!["querycat".to_string(), "build".to_string()];

    let mut push_path = |flag: &str, path: &Option<PathBuf>| {
        if let Some(path) = path {
            command.push(flag.to_string());
            command.push(path.display().to_string());
        }
    };
    push_path("--config", &args.config);
    push_path("--catalog-path", &args.catalog_path);
    push_path("--queries-path", &args.queries_path);

    command.push("--output-dir".to_string());
    command.push(args.output_dir.display().to_string());

    if let Some(max_samples) = args.max_samples {
        command.push("--max-samples".to_string());
        command.push(max_samples.to_string());
    }
    if let Some(max_features) = args.max_features {
        command.push("--max-features".to_string());
        command.push(max_features.to_string());
    }
    if args.threads > 0 {
        command.push("--threads".to_string());
        command.push(args.threads.to_string());
    }
    if args.skip_rephrase_log {
        command.push("--skip-rephrase-log".to_string());
    }

    command.join(" ")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::model::CategoryManifest;

    const CATALOG: &str = "product_id,gender,brand,category1,category2\n\
                           1,WOMEN,Acme,Shoes,Sneakers\n\
                           2,MEN,Acme,Shirts,Polo\n";

    const QUERIES: &str = "timestamp,session_id,user_id,search_query,product_clicked,product_id\n\
                           2019-08-01 10:00:00.120,1,u1,red sneakers,False,\n\
                           2019-08-01 10:00:09.500,1,u1,womens red sneakers,True,1\n\
                           2019-08-01 10:01:00,2,u2,polo shirt,True,2\n\
                           2019-08-01 10:02:00,3,u3,summer hat,False,\n\
                           2019-08-01 10:03:00,4,u4,linen shirt,True,77\n";

    fn write_inputs(dir: &Path) -> (PathBuf, PathBuf) {
        let catalog_path = dir.join("products.csv");
        let queries_path = dir.join("queries.csv");
        fs::write(&catalog_path, CATALOG).unwrap();
        fs::write(&queries_path, QUERIES).unwrap();
        (catalog_path, queries_path)
    }

    #[test]
    fn build_dataset_keeps_only_resolved_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let (catalog_path, queries_path) = write_inputs(dir.path());

        let output = build_dataset(&DatasetSettings {
            catalog_path,
            queries_path,
            max_samples: None,
            max_features: None,
        })
        .unwrap();

        assert_eq!(output.dataset.session_ids, vec![1, 2]);
        assert_eq!(output.dataset.features.shape()[..2], [2, 2]);
        assert_eq!(output.dataset.labels.shape(), [2, 2, 3]);
        assert_eq!(output.prepared.normalize.unresolved_sessions, 2);
        assert_eq!(output.prepared.assembly.missing_product_clicks, 1);
        assert_eq!(output.warnings.len(), 1);
    }

    #[test]
    fn build_dataset_respects_max_samples_and_max_features() {
        let dir = tempfile::tempdir().unwrap();
        let (catalog_path, queries_path) = write_inputs(dir.path());

        let output = build_dataset(&DatasetSettings {
            catalog_path,
            queries_path,
            max_samples: Some(2),
            max_features: Some(1),
        })
        .unwrap();

        assert_eq!(output.prepared.assembly.rows, 2);
        assert_eq!(output.dataset.vocabulary, ["red"]);
        assert_eq!(output.dataset.session_ids, vec![1]);
    }

    #[test]
    fn out_of_order_session_adds_manifest_warning() {
        let dir = tempfile::tempdir().unwrap();
        let (catalog_path, queries_path) = write_inputs(dir.path());
        fs::write(
            &queries_path,
            "header\n\
             2019-08-01 10:00:30,1,u1,red sneakers,False,\n\
             2019-08-01 10:00:10,1,u1,womens red sneakers,True,1\n\
             2019-08-01 10:01:00,2,u2,polo shirt,True,2\n",
        )
        .unwrap();

        let output = build_dataset(&DatasetSettings {
            catalog_path,
            queries_path,
            max_samples: None,
            max_features: None,
        })
        .unwrap();

        assert_eq!(output.prepared.normalize.out_of_order_sessions, 1);
        assert_eq!(output.dataset.session_ids, vec![1, 2]);
        assert_eq!(output.warnings.len(), 1);
        assert!(output.warnings[0].contains("out of timestamp order"));
    }

    #[test]
    fn malformed_query_row_aborts_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let (catalog_path, queries_path) = write_inputs(dir.path());
        fs::write(
            &queries_path,
            "header\n2019-08-01 10:00:00,1,u1,red, sneakers,False,\n",
        )
        .unwrap();

        let err = build_dataset(&DatasetSettings {
            catalog_path,
            queries_path,
            max_samples: None,
            max_features: None,
        })
        .unwrap_err();
        assert!(err.root_cause().to_string().contains("expected 6 fields"));
    }

    #[test]
    fn run_writes_manifests_and_rephrase_log() {
        let dir = tempfile::tempdir().unwrap();
        let (catalog_path, queries_path) = write_inputs(dir.path());
        let output_dir = dir.path().join("out");

        run(BuildArgs {
            config: None,
            catalog_path: Some(catalog_path),
            queries_path: Some(queries_path),
            output_dir: output_dir.clone(),
            max_samples: None,
            max_features: None,
            threads: 0,
            skip_rephrase_log: false,
        })
        .unwrap();

        let log = fs::read_to_string(output_dir.join(REPHRASE_LOG_FILE)).unwrap();
        assert!(log.contains("session 1"));
        assert!(log.contains("red sneakers (False -1)| womens red sneakers (True 9.0)| "));
        assert!(!log.contains("polo shirt"));

        let manifests: Vec<PathBuf> = fs::read_dir(output_dir.join("manifests"))
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        let build_manifest = manifests
            .iter()
            .find(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(BUILD_MANIFEST_PREFIX))
            })
            .unwrap();
        let manifest: BuildRunManifest =
            serde_json::from_slice(&fs::read(build_manifest).unwrap()).unwrap();
        assert_eq!(manifest.counts.sessions_total, 4);
        assert_eq!(manifest.counts.sessions_kept, 2);
        assert_eq!(manifest.counts.rephrase_spans, 1);
        assert_eq!(manifest.shapes.labels, [2, 2, 3]);
        assert_eq!(manifest.shapes.padding_rows, 1);
        assert_eq!(manifest.vocabulary, ["polo", "red", "shirt", "sneakers", "womens"]);
        assert_eq!(manifest.categories[0].label, "WOMEN/Shoes/Sneakers");
        assert_eq!(manifest.sources.len(), 2);

        let categories: CategoryManifest = serde_json::from_slice(
            &fs::read(output_dir.join("manifests").join(CATEGORY_MANIFEST_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(categories.product_count, 2);
        assert_eq!(categories.dummy_id, 2);
    }
}
