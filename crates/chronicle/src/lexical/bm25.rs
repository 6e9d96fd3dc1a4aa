//! Okapi BM25 over a single candidate batch
//!
//! Document frequencies come from the batch itself, never from a global
//! corpus, so the same batch always scores the same way.

use std::collections::{HashMap, HashSet};

use super::tokenize::tokenize;

pub const DEFAULT_K1: f32 = 1.8;
pub const DEFAULT_B: f32 = 0.5;

/// Term statistics for one batch of documents.
#[derive(Debug, Clone)]
pub struct Bm25Index {
    documents: Vec<HashMap<String, usize>>,
    lengths: Vec<usize>,
    document_frequency: HashMap<String, usize>,
    avg_length: f32,
    k1: f32,
    b: f32,
}

impl Bm25Index {
    pub fn new<'a>(documents: impl IntoIterator<Item = &'a str>, k1: f32, b: f32) -> Self {
        let mut term_counts = Vec::new();
        let mut lengths = Vec::new();
        let mut document_frequency: HashMap<String, usize> = HashMap::new();

        for document in documents {
            let tokens = tokenize(document);
            lengths.push(tokens.len());

            let mut counts: HashMap<String, usize> = HashMap::new();
            for token in tokens {
                *counts.entry(token).or_insert(0) += 1;
            }
            for term in counts.keys() {
                *document_frequency.entry(term.clone()).or_insert(0) += 1;
            }
            term_counts.push(counts);
        }

        let avg_length = if lengths.is_empty() {
            0.0
        } else {
            lengths.iter().sum::<usize>() as f32 / lengths.len() as f32
        };

        Self {
            documents: term_counts,
            lengths,
            document_frequency,
            avg_length,
            k1,
            b,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// `ln(1 + (N - df + 0.5) / (df + 0.5))`
    pub fn idf(&self, term: &str) -> f32 {
        let n = self.documents.len() as f32;
        let df = self.document_frequency.get(term).copied().unwrap_or(0) as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    fn score_document(&self, terms: &[String], idx: usize) -> f32 {
        let counts = &self.documents[idx];
        let length = self.lengths[idx] as f32;
        let length_norm = if self.avg_length > 0.0 {
            1.0 - self.b + self.b * length / self.avg_length
        } else {
            1.0
        };

        terms
            .iter()
            .filter_map(|term| counts.get(term).map(|tf| (term, *tf as f32)))
            .map(|(term, tf)| self.idf(term) * tf * (self.k1 + 1.0) / (tf + self.k1 * length_norm))
            .sum()
    }

    /// Raw BM25 score of every document against `query`.
    pub fn scores(&self, query: &str) -> Vec<f32> {
        let mut seen = HashSet::new();
        let terms: Vec<String> = tokenize(query)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();

        (0..self.documents.len())
            .map(|idx| self.score_document(&terms, idx))
            .collect()
    }

    /// Scores scaled into `[0, 1]` by the batch maximum.
    pub fn normalized_scores(&self, query: &str) -> Vec<f32> {
        let raw = self.scores(query);
        let max = raw.iter().copied().fold(0.0f32, f32::max);
        if max <= 0.0 {
            return vec![0.0; raw.len()];
        }
        raw.into_iter().map(|s| s / max).collect()
    }
}
