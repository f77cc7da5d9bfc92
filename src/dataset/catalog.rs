use std::collections::HashMap;
use std::io::BufRead;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{DataError, DataResult};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Gender {
    Women,
    Men,
    Kids,
    Unisex,
}

impl Gender {
    /// Marker order matters: the first marker found in a row decides the gender.
    pub const ALL: [Gender; 4] = [Gender::Women, Gender::Men, Gender::Kids, Gender::Unisex];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Women => "WOMEN",
            Self::Men => "MEN",
            Self::Kids => "KIDS",
            Self::Unisex => "UNISEX",
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            Self::Women => ",WOMEN,",
            Self::Men => ",MEN,",
            Self::Kids => ",KIDS,",
            Self::Unisex => ",UNISEX,",
        }
    }

    fn detect(line: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|gender| line.contains(gender.marker()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProductRecord {
    pub product_id: u64,
    pub gender: Gender,
    pub cat1: String,
    pub cat2: String,
}

impl ProductRecord {
    pub fn category_key(&self) -> CategoryKey {
        CategoryKey {
            gender: self.gender,
            cat1: self.cat1.clone(),
            cat2: self.cat2.clone(),
        }
    }
}

impl std::fmt::Display for ProductRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} {}/{}/{}",
            self.product_id,
            self.gender.as_str(),
            self.cat1,
            self.cat2
        )
    }
}

/// Composite `gender ‖ cat1 ‖ cat2` identity of a product category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CategoryKey {
    pub gender: Gender,
    pub cat1: String,
    pub cat2: String,
}

impl std::fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.gender.as_str(), self.cat1, self.cat2)
    }
}

/// Parses one catalog row.
///
/// The product id is the first comma field. The text after the gender marker
/// starts with the brand column, followed by the two category columns.
pub fn parse_catalog_line(source_name: &str, line_no: usize, line: &str) -> DataResult<ProductRecord> {
    let gender = Gender::detect(line).ok_or_else(|| DataError::SchemaViolation {
        source_name: source_name.to_string(),
        line: line_no,
        record: line.to_string(),
    })?;

    let raw_id = line.split(',').next().unwrap_or_default().trim();
    let product_id = raw_id.parse::<u64>().map_err(|_| {
        DataError::malformed(source_name, line_no, format!("invalid product id {raw_id:?}"))
    })?;

    let tail = line
        .split_once(gender.marker())
        .map(|(_, tail)| tail)
        .unwrap_or_default();
    let mut fields = tail.split(',').skip(1);
    let (Some(cat1), Some(cat2)) = (fields.next(), fields.next()) else {
        return Err(DataError::malformed(
            source_name,
            line_no,
            format!("expected two category fields after {}", gender.marker()),
        ));
    };

    Ok(ProductRecord {
        product_id,
        gender,
        cat1: cat1.to_string(),
        cat2: cat2.to_string(),
    })
}

/// Reads every catalog row after the header. Any bad row aborts the load.
pub fn read_catalog<R: BufRead>(reader: R, source_name: &str) -> DataResult<Vec<ProductRecord>> {
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate().skip(1) {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(parse_catalog_line(source_name, index + 1, &line)?);
    }

    Ok(records)
}

#[derive(Debug, Default)]
pub struct ProductLookup {
    products: HashMap<u64, Arc<ProductRecord>>,
}

impl ProductLookup {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ProductRecord>) -> Self {
        let products = records
            .into_iter()
            .map(|record| (record.product_id, Arc::new(record.clone())))
            .collect();
        Self { products }
    }

    pub fn lookup(&self, product_id: u64) -> Option<Arc<ProductRecord>> {
        self.products.get(&product_id).cloned()
    }
}
