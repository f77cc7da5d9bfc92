use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::dataset::catalog::{CategoryKey, ProductRecord};

pub const DUMMY_CATEGORY: &str = "dummy";

/// A label slot: either a real catalog category or the padding category.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Category {
    Real(usize),
    Padding,
}

impl Category {
    /// Collapses the slot to its column in a one-hot vector of width `n_real + 1`.
    pub fn index(self, n_real: usize) -> usize {
        match self {
            Self::Real(id) => id,
            Self::Padding => n_real,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub id: usize,
    pub label: String,
    pub gender: Option<String>,
    pub cat1: Option<String>,
    pub cat2: Option<String>,
}

/// Dense ids for every distinct category triple, in first-seen order.
///
/// Id `n` (the count of real categories) is reserved for the dummy category
/// that labels padding rows.
#[derive(Debug, Default, Clone)]
pub struct CategoryRegistry {
    ids: HashMap<CategoryKey, usize>,
    keys: Vec<CategoryKey>,
}

impl CategoryRegistry {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ProductRecord>) -> Self {
        let mut registry = Self::default();
        for record in records {
            registry.register(record.category_key());
        }
        registry
    }

    fn register(&mut self, key: CategoryKey) -> usize {
        if let Some(id) = self.ids.get(&key) {
            return *id;
        }

        let id = self.keys.len();
        self.ids.insert(key.clone(), id);
        self.keys.push(key);
        id
    }

    pub fn resolve(&self, key: &CategoryKey) -> Option<usize> {
        self.ids.get(key).copied()
    }

    /// Count of real categories, which is also the dummy id.
    pub fn real_count(&self) -> usize {
        self.keys.len()
    }

    pub fn dummy_id(&self) -> usize {
        self.keys.len()
    }

    /// Count including the dummy category.
    pub fn size(&self) -> usize {
        self.keys.len() + 1
    }

    pub fn key(&self, id: usize) -> Option<&CategoryKey> {
        self.keys.get(id)
    }

    pub fn label(&self, id: usize) -> Option<String> {
        if id == self.dummy_id() {
            return Some(DUMMY_CATEGORY.to_string());
        }
        self.key(id).map(ToString::to_string)
    }

    /// One entry per id, the dummy category last.
    pub fn entries(&self) -> Vec<CategoryEntry> {
        (0..self.size())
            .map(|id| {
                let key = self.key(id);
                CategoryEntry {
                    id,
                    label: self.label(id).unwrap_or_default(),
                    gender: key.map(|key| key.gender.as_str().to_string()),
                    cat1: key.map(|key| key.cat1.clone()),
                    cat2: key.map(|key| key.cat2.clone()),
                }
            })
            .collect()
    }
}
