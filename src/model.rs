use serde::{Deserialize, Serialize};

use crate::dataset::categories::CategoryEntry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub catalog: SourceFile,
    pub product_count: usize,
    pub category_count: usize,
    pub dummy_id: usize,
    pub categories: Vec<CategoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildPaths {
    pub output_dir: String,
    pub rephrase_log_path: Option<String>,
    pub manifest_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildCounts {
    pub catalog_products: usize,
    pub categories: usize,
    pub query_rows: usize,
    pub clicked_rows: usize,
    pub missing_product_clicks: usize,
    pub sessions_total: usize,
    pub sessions_with_rephrase: usize,
    pub rephrase_spans: usize,
    pub sessions_unresolved: usize,
    pub sessions_kept: usize,
    pub sessions_out_of_order: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorShapes {
    pub features: [usize; 3],
    pub labels: [usize; 3],
    pub target_len: usize,
    pub vocabulary_size: usize,
    pub max_features: Option<usize>,
    pub padding_rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub finished_at: String,
    pub duration_ms: u128,
    pub command: String,
    pub paths: BuildPaths,
    pub sources: Vec<SourceFile>,
    pub max_samples: Option<usize>,
    pub counts: BuildCounts,
    pub shapes: TensorShapes,
    pub categories: Vec<CategoryEntry>,
    pub vocabulary: Vec<String>,
    pub warnings: Vec<String>,
}
