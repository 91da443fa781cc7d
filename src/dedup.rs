//! Near-duplicate detection via normalized edit-distance similarity.
//!
//! Candidates are compared against a growing corpus snapshot: the existing
//! question texts loaded once per task, plus every candidate accepted earlier
//! in the same run (including earlier in the same batch). Comparison is
//! O(batch × corpus) — a known scaling limit, acceptable while the corpus
//! stays in the low thousands and batches in the tens.

use crate::questions::model::Candidate;

/// Similarity at or above this percentage rejects a candidate.
pub const DEFAULT_SIMILARITY_THRESHOLD: u8 = 90;

/// The working set of question texts used for deduplication during one task
/// run.
///
/// Each generation task captures its own snapshot at start; two concurrent
/// tasks for the same criteria can therefore both accept near-duplicates of
/// each other's output. That race is left unguarded.
#[derive(Debug, Default)]
pub struct CorpusSnapshot {
    texts: Vec<String>,
}

impl CorpusSnapshot {
    pub fn new(existing_texts: Vec<String>) -> Self {
        Self {
            texts: existing_texts
                .into_iter()
                .map(|t| normalize(&t))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Record an accepted text so later candidates are compared against it.
    pub fn accept(&mut self, text: &str) {
        self.texts.push(normalize(text));
    }

    /// Highest similarity (0–100) between `text` and any snapshot entry.
    pub fn max_similarity(&self, text: &str) -> u8 {
        let needle = normalize(text);
        let mut best = 0u8;
        for existing in &self.texts {
            if *existing == needle {
                return 100;
            }
            let sim = similarity_percent(existing, &needle);
            if sim > best {
                best = sim;
            }
        }
        best
    }
}

/// Result of filtering one batch against the snapshot.
#[derive(Debug)]
pub struct DedupOutcome {
    pub unique: Vec<Candidate>,
    pub duplicate_count: usize,
}

/// Partition `candidates` into unique items and duplicates.
///
/// Accepted candidates are appended to the snapshot immediately, so a batch
/// containing two near-identical questions keeps only the first.
pub fn filter_batch(
    candidates: Vec<Candidate>,
    snapshot: &mut CorpusSnapshot,
    threshold: u8,
) -> DedupOutcome {
    let mut unique = Vec::with_capacity(candidates.len());
    let mut duplicate_count = 0;

    for candidate in candidates {
        let sim = snapshot.max_similarity(&candidate.question_sv);
        if sim >= threshold {
            duplicate_count += 1;
            continue;
        }
        snapshot.accept(&candidate.question_sv);
        unique.push(candidate);
    }

    DedupOutcome {
        unique,
        duplicate_count,
    }
}

/// Similarity of two normalized strings as a percentage:
/// `100 × (1 - levenshtein / max(len))`.
pub fn similarity_percent(a: &str, b: &str) -> u8 {
    if a == b {
        return 100;
    }
    let len_a = a.chars().count();
    let len_b = b.chars().count();
    let max_len = len_a.max(len_b);
    if max_len == 0 {
        return 100;
    }
    let dist = levenshtein(a, b);
    let ratio = 1.0 - (dist as f64 / max_len as f64);
    (ratio * 100.0).round().max(0.0) as u8
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Standard dynamic-programming Levenshtein distance over chars.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (m, n) = (a.len(), b.len());
    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    // Two-row DP keeps memory at O(n) for long question texts.
    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];
    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1)
                .min(curr[j - 1] + 1)
                .min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[n]
}
