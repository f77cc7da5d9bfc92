use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::CatalogArgs;
use crate::dataset::catalog::{ProductRecord, read_catalog};
use crate::dataset::categories::CategoryRegistry;
use crate::model::{CategoryManifest, SourceFile};
use crate::util::{now_utc_string, open_buffered, sha256_file, write_json_pretty};

pub const CATEGORY_MANIFEST_FILE: &str = "categories.json";

pub fn run(args: CatalogArgs) -> Result<()> {
    let products = load_catalog(&args.catalog_path)?;
    let registry = CategoryRegistry::from_records(&products);
    let manifest = build_manifest(&args.catalog_path, products.len(), &registry)?;

    if args.dry_run {
        info!(
            products = manifest.product_count,
            categories = manifest.category_count,
            source = %manifest.catalog.path,
            "catalog dry-run complete"
        );
        return Ok(());
    }

    let manifest_path = args.manifest_path.unwrap_or_else(|| {
        args.output_dir
            .join("manifests")
            .join(CATEGORY_MANIFEST_FILE)
    });

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote category manifest");
    info!(
        products = manifest.product_count,
        categories = manifest.category_count,
        "catalog completed"
    );

    Ok(())
}

pub fn load_catalog(path: &Path) -> Result<Vec<ProductRecord>> {
    let reader = open_buffered(path)?;
    let products = read_catalog(reader, &path.display().to_string())
        .with_context(|| format!("failed to load catalog {}", path.display()))?;

    info!(path = %path.display(), products = products.len(), "loaded catalog");
    Ok(products)
}

pub fn build_manifest(
    catalog_path: &Path,
    product_count: usize,
    registry: &CategoryRegistry,
) -> Result<CategoryManifest> {
    Ok(CategoryManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        catalog: SourceFile {
            path: catalog_path.display().to_string(),
            sha256: sha256_file(catalog_path)?,
        },
        product_count,
        category_count: registry.real_count(),
        dummy_id: registry.dummy_id(),
        categories: registry.entries(),
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn run_writes_category_manifest_with_dummy_entry() {
        let dir = tempfile::tempdir().unwrap();
        let catalog_path = dir.path().join("products.csv");
        fs::write(
            &catalog_path,
            "product_id,gender,brand,category1,category2\n\
             1,WOMEN,A,Shoes,Sneakers\n\
             2,WOMEN,B,Shoes,Sneakers\n\
             3,MEN,C,Shirts,Polo\n",
        )
        .unwrap();

        run(CatalogArgs {
            catalog_path: catalog_path.clone(),
            output_dir: dir.path().to_path_buf(),
            manifest_path: None,
            dry_run: false,
        })
        .unwrap();

        let raw = fs::read(dir.path().join("manifests").join(CATEGORY_MANIFEST_FILE)).unwrap();
        let manifest: CategoryManifest = serde_json::from_slice(&raw).unwrap();
        assert_eq!(manifest.product_count, 3);
        assert_eq!(manifest.category_count, 2);
        assert_eq!(manifest.dummy_id, 2);
        assert_eq!(manifest.categories.len(), 3);
        assert_eq!(manifest.categories[1].label, "MEN/Shirts/Polo");
    }

    #[test]
    fn load_catalog_reports_path_on_schema_violation() {
        let dir = tempfile::tempdir().unwrap();
        let catalog_path = dir.path().join("products.csv");
        fs::write(&catalog_path, "header\n1,ADULT,A,Shoes,Sneakers\n").unwrap();

        let err = load_catalog(&catalog_path).unwrap_err();
        assert!(err.to_string().contains("failed to load catalog"));
        let root = err.root_cause().to_string();
        assert!(root.contains("schema violation"));
    }
}
