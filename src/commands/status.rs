use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::build::BUILD_MANIFEST_PREFIX;
use crate::commands::catalog::CATEGORY_MANIFEST_FILE;
use crate::model::{BuildRunManifest, CategoryManifest};

pub fn run(args: StatusArgs) -> Result<()> {
    let manifest_dir = args.output_dir.join("manifests");
    let category_path = manifest_dir.join(CATEGORY_MANIFEST_FILE);

    info!(output_dir = %args.output_dir.display(), "status requested");

    match latest_build_manifest(&manifest_dir)? {
        Some(path) => {
            let raw = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
            let manifest: BuildRunManifest = serde_json::from_slice(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?;

            info!(
                path = %path.display(),
                run_id = %manifest.run_id,
                status = %manifest.status,
                finished_at = %manifest.finished_at,
                duration_ms = manifest.duration_ms,
                query_rows = manifest.counts.query_rows,
                sessions = manifest.counts.sessions_total,
                sessions_kept = manifest.counts.sessions_kept,
                sessions_unresolved = manifest.counts.sessions_unresolved,
                rephrase_spans = manifest.counts.rephrase_spans,
                features = ?manifest.shapes.features,
                labels = ?manifest.shapes.labels,
                warnings = manifest.warnings.len(),
                "loaded build run manifest"
            );
        }
        None => warn!(path = %manifest_dir.display(), "no build run manifest found"),
    }

    if category_path.exists() {
        let raw = fs::read(&category_path)
            .with_context(|| format!("failed to read {}", category_path.display()))?;
        let manifest: CategoryManifest = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", category_path.display()))?;

        info!(
            generated_at = %manifest.generated_at,
            products = manifest.product_count,
            categories = manifest.category_count,
            dummy_id = manifest.dummy_id,
            "loaded category manifest"
        );
    } else {
        warn!(path = %category_path.display(), "category manifest missing");
    }

    Ok(())
}

/// Build manifests carry a compact UTC timestamp, so the lexically greatest
/// name is the newest run.
pub fn latest_build_manifest(manifest_dir: &Path) -> Result<Option<PathBuf>> {
    if !manifest_dir.exists() {
        return Ok(None);
    }

    let entries = fs::read_dir(manifest_dir)
        .with_context(|| format!("failed to read {}", manifest_dir.display()))?;

    let mut latest: Option<PathBuf> = None;
    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", manifest_dir.display()))?;
        let path = entry.path();

        let is_build_manifest = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with(BUILD_MANIFEST_PREFIX) && name.ends_with(".json"))
            .unwrap_or(false);
        if !is_build_manifest {
            continue;
        }

        if latest.as_ref().is_none_or(|current| path > *current) {
            latest = Some(path);
        }
    }

    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_build_manifest_picks_newest_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "build_run_20240101T000000Z.json",
            "build_run_20250101T000000Z.json",
            "categories.json",
        ] {
            fs::write(dir.path().join(name), "{}").unwrap();
        }

        let latest = latest_build_manifest(dir.path()).unwrap().unwrap();
        assert!(latest.ends_with("build_run_20250101T000000Z.json"));
    }

    #[test]
    fn missing_directory_yields_no_manifest() {
        let dir = tempfile::tempdir().unwrap();
        assert!(latest_build_manifest(&dir.path().join("absent")).unwrap().is_none());
    }

    #[test]
    fn run_tolerates_empty_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        run(StatusArgs {
            output_dir: dir.path().to_path_buf(),
        })
        .unwrap();
    }
}
