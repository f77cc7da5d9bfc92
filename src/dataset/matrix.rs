use serde::Serialize;
use tracing::info;

use crate::dataset::categories::{Category, CategoryRegistry};
use crate::dataset::session::{Session, SessionSet};
use crate::error::{DataError, DataResult};
use crate::vectorizer::TextVectorizer;

/// Dense row-major `f32` tensor of rank 3.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor3 {
    shape: [usize; 3],
    data: Vec<f32>,
}

impl Tensor3 {
    pub fn zeros(shape: [usize; 3]) -> Self {
        Self {
            shape,
            data: vec![0.0; shape[0] * shape[1] * shape[2]],
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// The innermost vector at `[sample, step]`.
    #[cfg(test)]
    pub fn row(&self, sample: usize, step: usize) -> Option<&[f32]> {
        let width = self.shape[2];
        self.offset(sample, step)
            .map(|offset| &self.data[offset..offset + width])
    }

    fn row_mut(&mut self, sample: usize, step: usize) -> &mut [f32] {
        let width = self.shape[2];
        let offset = (sample * self.shape[1] + step) * width;
        &mut self.data[offset..offset + width]
    }

    #[cfg(test)]
    fn offset(&self, sample: usize, step: usize) -> Option<usize> {
        if sample >= self.shape[0] || step >= self.shape[1] {
            return None;
        }
        Some((sample * self.shape[1] + step) * self.shape[2])
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DatasetShape {
    pub sessions: usize,
    pub target_len: usize,
    pub vocabulary_size: usize,
    pub label_width: usize,
}

/// Padded `(features, labels)` pair, one row per resolved session.
#[derive(Debug, Clone)]
pub struct SequenceDataset {
    pub features: Tensor3,
    pub labels: Tensor3,
    pub session_ids: Vec<u64>,
    pub lengths: Vec<usize>,
    pub target_len: usize,
    pub vocabulary: Vec<String>,
}

impl SequenceDataset {
    pub fn shape(&self) -> DatasetShape {
        DatasetShape {
            sessions: self.features.shape()[0],
            target_len: self.target_len,
            vocabulary_size: self.vocabulary.len(),
            label_width: self.labels.shape()[2],
        }
    }

    /// Padding rows across all samples.
    pub fn padding_rows(&self) -> usize {
        self.lengths
            .iter()
            .map(|length| self.target_len - length)
            .sum()
    }

    /// Column index of the hot label at `[sample, step]`.
    #[cfg(test)]
    pub fn label_at(&self, sample: usize, step: usize) -> Option<usize> {
        self.labels
            .row(sample, step)?
            .iter()
            .position(|value| *value == 1.0)
    }
}

pub struct MatrixBuilder<'a, V> {
    registry: &'a CategoryRegistry,
    vectorizer: V,
}

impl<'a, V: TextVectorizer> MatrixBuilder<'a, V> {
    pub fn new(registry: &'a CategoryRegistry, vectorizer: V) -> Self {
        Self {
            registry,
            vectorizer,
        }
    }

    pub fn build(&mut self, sessions: &SessionSet) -> DataResult<SequenceDataset> {
        let kept: Vec<&Session> = sessions
            .iter()
            .filter(|session| !session.has_unresolved && !session.is_empty())
            .collect();
        if kept.is_empty() {
            return Err(DataError::EmptyDataset);
        }

        let mut queries: Vec<&str> = Vec::new();
        let mut spans: Vec<(usize, usize)> = Vec::with_capacity(kept.len());
        let mut labels: Vec<Vec<Category>> = Vec::with_capacity(kept.len());
        for session in &kept {
            let start = queries.len();
            let mut session_labels = Vec::with_capacity(session.len());
            for event in &session.events {
                let id = event
                    .category_id
                    .ok_or_else(|| DataError::UnregisteredCategory {
                        key: event
                            .product_info
                            .as_ref()
                            .map(|product| product.category_key().to_string())
                            .unwrap_or_else(|| "<none>".to_string()),
                    })?;
                queries.push(event.query_text.as_str());
                session_labels.push(Category::Real(id));
            }
            spans.push((start, queries.len()));
            labels.push(session_labels);
        }
        let target_len = spans.iter().map(|(start, end)| end - start).max().unwrap_or(0);

        let term_rows = self.vectorizer.fit_transform(&queries);
        if term_rows.len() != queries.len() {
            return Err(DataError::VectorizerRowMismatch {
                documents: queries.len(),
                rows: term_rows.len(),
            });
        }
        let vocabulary_size = self.vectorizer.dimensions();
        if vocabulary_size == 0 {
            return Err(DataError::EmptyVocabulary);
        }

        let n_real = self.registry.real_count();
        let label_width = self.registry.size();
        let mut features = Tensor3::zeros([kept.len(), target_len, vocabulary_size]);
        let mut one_hot = Tensor3::zeros([kept.len(), target_len, label_width]);

        for (sample, (start, end)) in spans.iter().enumerate() {
            for (step, counts) in term_rows[*start..*end].iter().enumerate() {
                let row = features.row_mut(sample, step);
                for (column, count) in counts {
                    row[*column] = *count;
                }
            }

            let padding = target_len - (end - start);
            let slots = labels[sample]
                .iter()
                .copied()
                .chain(std::iter::repeat_n(Category::Padding, padding));
            for (step, slot) in slots.enumerate() {
                one_hot.row_mut(sample, step)[slot.index(n_real)] = 1.0;
            }
        }

        info!(
            sessions = kept.len(),
            target_len,
            vocabulary_size,
            label_width,
            "built padded sequence matrices"
        );

        Ok(SequenceDataset {
            features,
            labels: one_hot,
            session_ids: kept.iter().map(|session| session.session_id).collect(),
            lengths: spans.iter().map(|(start, end)| end - start).collect(),
            target_len,
            vocabulary: self.vectorizer.vocabulary().to_vec(),
        })
    }
}
