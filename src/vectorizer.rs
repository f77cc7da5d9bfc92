use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use regex::Regex;

/// Sparse `(column, count)` pairs for one document, sorted by column.
pub type TermCounts = Vec<(usize, f32)>;

/// Bag-of-words text-to-vector service used by the matrix builder.
pub trait TextVectorizer {
    /// Learns the vocabulary from `documents` and returns one row per document.
    fn fit_transform(&mut self, documents: &[&str]) -> Vec<TermCounts>;

    /// Column labels, in column order.
    fn vocabulary(&self) -> &[String];

    fn dimensions(&self) -> usize {
        self.vocabulary().len()
    }
}

/// Term-count vectorizer over lowercased tokens of two or more word characters.
///
/// With `max_features` set, only the most frequent terms across the corpus
/// are kept (ties broken alphabetically). Columns are ordered alphabetically.
#[derive(Debug)]
pub struct CountVectorizer {
    max_features: Option<usize>,
    token_pattern: Regex,
    vocabulary: Vec<String>,
    columns: HashMap<String, usize>,
}

impl CountVectorizer {
    pub fn new(max_features: Option<usize>) -> Result<Self> {
        Ok(Self {
            max_features,
            token_pattern: Regex::new(r"\b\w\w+\b").context("failed to compile token regex")?,
            vocabulary: Vec::new(),
            columns: HashMap::new(),
        })
    }

    pub fn tokenize(&self, document: &str) -> Vec<String> {
        let lowered = document.to_lowercase();
        self.token_pattern
            .find_iter(&lowered)
            .map(|token| token.as_str().to_string())
            .collect()
    }

    fn fit(&mut self, tokenized: &[Vec<String>]) {
        let mut totals: HashMap<&str, usize> = HashMap::new();
        for tokens in tokenized {
            for token in tokens {
                *totals.entry(token.as_str()).or_insert(0) += 1;
            }
        }

        let mut terms: Vec<(&str, usize)> = totals.into_iter().collect();
        if let Some(limit) = self.max_features {
            terms.sort_by(|left, right| right.1.cmp(&left.1).then(left.0.cmp(right.0)));
            terms.truncate(limit);
        }

        let mut vocabulary: Vec<String> = terms.into_iter().map(|(term, _)| term.to_string()).collect();
        vocabulary.sort();

        self.columns = vocabulary
            .iter()
            .enumerate()
            .map(|(column, term)| (term.clone(), column))
            .collect();
        self.vocabulary = vocabulary;
    }

    fn transform_tokens(&self, tokens: &[String]) -> TermCounts {
        let mut counts: BTreeMap<usize, f32> = BTreeMap::new();
        for token in tokens {
            if let Some(column) = self.columns.get(token) {
                *counts.entry(*column).or_insert(0.0) += 1.0;
            }
        }
        counts.into_iter().collect()
    }
}

impl TextVectorizer for CountVectorizer {
    fn fit_transform(&mut self, documents: &[&str]) -> Vec<TermCounts> {
        let tokenized: Vec<Vec<String>> = documents
            .iter()
            .map(|document| self.tokenize(document))
            .collect();
        self.fit(&tokenized);
        tokenized
            .iter()
            .map(|tokens| self.transform_tokens(tokens))
            .collect()
    }

    fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_lowercases_and_drops_single_characters() {
        let vectorizer = CountVectorizer::new(None).unwrap();
        assert_eq!(
            vectorizer.tokenize("Nike Air-Max 2 x shoes"),
            vec!["nike", "air", "max", "shoes"]
        );
    }

    #[test]
    fn fit_transform_counts_terms_in_alphabetical_columns() {
        let mut vectorizer = CountVectorizer::new(None).unwrap();
        let rows = vectorizer.fit_transform(&["red shoes red", "blue shoes"]);

        assert_eq!(vectorizer.vocabulary(), ["blue", "red", "shoes"]);
        assert_eq!(rows[0], vec![(1, 2.0), (2, 1.0)]);
        assert_eq!(rows[1], vec![(0, 1.0), (2, 1.0)]);
    }

    #[test]
    fn max_features_keeps_most_frequent_terms() {
        let mut vectorizer = CountVectorizer::new(Some(2)).unwrap();
        let rows = vectorizer.fit_transform(&["shoes red", "shoes blue", "shoes green red"]);

        assert_eq!(vectorizer.vocabulary(), ["red", "shoes"]);
        assert_eq!(vectorizer.dimensions(), 2);
        assert_eq!(rows[1], vec![(1, 1.0)]);
    }

    #[test]
    fn max_features_breaks_count_ties_alphabetically() {
        let mut vectorizer = CountVectorizer::new(Some(1)).unwrap();
        vectorizer.fit_transform(&["zebra apple"]);
        assert_eq!(vectorizer.vocabulary(), ["apple"]);
    }
}
