//! Session normalization and padded matrix construction.
//!
//! Data flows catalog → registry/lookup, query rows → sessions → rephrase
//! normalizer → matrix builder. Everything here is in-memory; file handling
//! lives in `commands`.

pub mod catalog;
pub mod categories;
pub mod matrix;
pub mod queries;
pub mod rephrase;
pub mod report;
pub mod session;


use crate::error::DataResult;

use catalog::{ProductLookup, ProductRecord};
use categories::CategoryRegistry;
use queries::QueryRow;
use rephrase::{NormalizeStats, RephraseNormalizer};
use session::{AssemblyStats, SessionAssembler, SessionSet};

/// Catalog-derived lookups plus normalized sessions, ready for the matrix builder.
#[derive(Debug)]
pub struct PreparedSessions {
    pub registry: CategoryRegistry,
    pub sessions: SessionSet,
    pub assembly: AssemblyStats,
    pub normalize: NormalizeStats,
}

pub fn prepare(products: &[ProductRecord], rows: Vec<QueryRow>) -> DataResult<PreparedSessions> {
    let registry = CategoryRegistry::from_records(products);
    let lookup = ProductLookup::from_records(products);

    let (mut sessions, assembly) = SessionAssembler::new(&lookup).assemble(rows);
    let normalize = RephraseNormalizer::new(&registry).normalize_all(&mut sessions)?;

    Ok(PreparedSessions {
        registry,
        sessions,
        assembly,
        normalize,
    })
}
