//! TF-IDF keyword index
//!
//! Features are lowercased word unigrams plus adjacent-word bigrams. Each
//! chunk becomes a raw-count vector weighted by smoothed IDF
//! (`ln((1 + n) / (1 + df)) + 1`) and L2-normalized, so a query scores a
//! chunk by plain dot product, i.e. cosine similarity in `[0, 1]`.

use docvault_common::text::tokenize;
use std::collections::HashMap;

/// Sparse row: (feature column, weight), sorted by column
type SparseVector = Vec<(usize, f32)>;

/// Immutable TF-IDF model over one chunk set
#[derive(Debug, Clone, Default)]
pub struct LexicalIndex {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
    rows: Vec<SparseVector>,
}

impl LexicalIndex {
    /// Fit the vocabulary and IDF table on `texts` and vectorize each one.
    /// Row `i` of the index corresponds to `texts[i]`.
    pub fn build<'a, I>(texts: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let mut document_frequency: Vec<u32> = Vec::new();
        let mut counts: Vec<HashMap<usize, u32>> = Vec::new();

        for text in texts {
            let mut row: HashMap<usize, u32> = HashMap::new();
            for feature in features(text) {
                let next = vocabulary.len();
                let column = *vocabulary.entry(feature).or_insert(next);
                if column == document_frequency.len() {
                    document_frequency.push(0);
                }
                *row.entry(column).or_insert(0) += 1;
            }
            for column in row.keys() {
                document_frequency[*column] += 1;
            }
            counts.push(row);
        }

        let n = counts.len() as f32;
        let idf: Vec<f32> = document_frequency
            .iter()
            .map(|&df| ((1.0 + n) / (1.0 + df as f32)).ln() + 1.0)
            .collect();

        let rows = counts
            .into_iter()
            .map(|row| weigh(row.into_iter(), &idf))
            .collect();

        Self {
            vocabulary,
            idf,
            rows,
        }
    }

    /// Number of indexed rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct features seen at build time
    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Vectorize a query against the fitted vocabulary; unknown features are dropped
    fn vectorize(&self, text: &str) -> SparseVector {
        let mut counts: HashMap<usize, u32> = HashMap::new();
        for feature in features(text) {
            if let Some(&column) = self.vocabulary.get(&feature) {
                *counts.entry(column).or_insert(0) += 1;
            }
        }
        weigh(counts.into_iter(), &self.idf)
    }

    /// Score every row against `query`, returning `(row, score)` for rows
    /// with a positive score, in row order
    pub fn score(&self, query: &str) -> Vec<(usize, f32)> {
        if self.rows.is_empty() {
            return Vec::new();
        }
        let query = self.vectorize(query);
        if query.is_empty() {
            return Vec::new();
        }

        self.rows
            .iter()
            .enumerate()
            .filter_map(|(row, vector)| {
                let score = sparse_dot(&query, vector);
                (score > 0.0).then_some((row, score))
            })
            .collect()
    }
}

/// Unigram and bigram features of `text`
fn features(text: &str) -> Vec<String> {
    let tokens = tokenize(text);
    let mut features = Vec::with_capacity(tokens.len() * 2);
    for pair in tokens.windows(2) {
        features.push(format!("{} {}", pair[0], pair[1]));
    }
    features.extend(tokens);
    features
}

fn weigh(counts: impl Iterator<Item = (usize, u32)>, idf: &[f32]) -> SparseVector {
    let mut vector: SparseVector = counts
        .map(|(column, count)| (column, count as f32 * idf[column]))
        .collect();
    vector.sort_unstable_by_key(|(column, _)| *column);

    let norm = vector.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|(_, w)| *w /= norm);
    }
    vector
}

fn sparse_dot(a: &[(usize, f32)], b: &[(usize, f32)]) -> f32 {
    let (mut i, mut j, mut sum) = (0, 0, 0.0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                sum += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    sum
}
