use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "querycat",
    version,
    about = "Normalize search sessions into padded query/category training matrices"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Catalog(CatalogArgs),
    Build(BuildArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CatalogArgs {
    #[arg(long)]
    pub catalog_path: PathBuf,

    #[arg(long, default_value = ".cache/querycat")]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub catalog_path: Option<PathBuf>,

    #[arg(long)]
    pub queries_path: Option<PathBuf>,

    #[arg(long, default_value = ".cache/querycat")]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub max_samples: Option<usize>,

    #[arg(long)]
    pub max_features: Option<usize>,

    #[arg(long, default_value_t = 0)]
    pub threads: usize,

    #[arg(long, default_value_t = false)]
    pub skip_rephrase_log: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/querycat")]
    pub output_dir: PathBuf,
}
