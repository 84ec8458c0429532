//! Recommendation matching.
//!
//! Decides which catalog items a free-text sales reply actually recommends.
//! Each sentence of the reply is compared with every candidate title: a
//! literal mention is an exact match, anything else is scored by cosine
//! similarity of embeddings and kept when it clears the threshold.
//!
//! Within one sentence accepted items are emitted weakest score first, so a
//! borderline semantic match sits next to the exact mentions that follow it.
//! Across sentences the first qualifying sentence wins and a title is
//! emitted at most once.

use crate::error::SimulationError;
use crate::search::{CandidateDocument, LookupServiceClient};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error};

/// Default similarity a semantic match must exceed.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.70;

/// Turns texts into embedding vectors, one per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds every text in `texts`.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SimulationError>;
}

/// Finds the candidates a reply recommends, in first-mention order.
#[async_trait]
pub trait ItemMatcher: Send + Sync {
    /// Returns the recommended subset of `candidates`.
    async fn recommended_items(
        &self,
        response: &str,
        candidates: &[CandidateDocument],
    ) -> Result<Vec<CandidateDocument>, SimulationError>;
}

/// In-process matcher backed by an [`Embedder`].
#[derive(Clone)]
pub struct RecommendationMatcher {
    embedder: Arc<dyn Embedder>,
    threshold: f32,
}

impl RecommendationMatcher {
    /// Creates a matcher with the default threshold.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    /// Overrides the similarity threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Returns the similarity threshold.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Embeds whichever of `texts` are not cached yet, in a single call.
    async fn fill_cache<'t>(
        &self,
        cache: &mut HashMap<String, Vec<f32>>,
        texts: impl IntoIterator<Item = &'t str>,
    ) -> Result<(), SimulationError> {
        let mut missing: Vec<String> = Vec::new();
        for text in texts {
            if !cache.contains_key(text) && !missing.iter().any(|m| m == text) {
                missing.push(text.to_string());
            }
        }
        if missing.is_empty() {
            return Ok(());
        }

        let vectors = self.embedder.embed(&missing).await?;
        if vectors.len() != missing.len() {
            return Err(SimulationError::Embedding(format!(
                "Expected {} embeddings, received {}",
                missing.len(),
                vectors.len()
            )));
        }
        cache.extend(missing.into_iter().zip(vectors));
        Ok(())
    }
}

struct SentenceEntry<'a> {
    candidate: &'a CandidateDocument,
    title: &'a str,
    lowered: String,
    exact: bool,
}

#[async_trait]
impl ItemMatcher for RecommendationMatcher {
    async fn recommended_items(
        &self,
        response: &str,
        candidates: &[CandidateDocument],
    ) -> Result<Vec<CandidateDocument>, SimulationError> {
        if candidates.is_empty() || response.trim().is_empty() {
            return Ok(Vec::new());
        }

        let lowered_response = response.to_lowercase();
        let mut recommended = Vec::new();
        let mut recommended_titles: HashSet<&str> = HashSet::new();
        let mut cache: HashMap<String, Vec<f32>> = HashMap::new();

        for sentence in split_sentences(&lowered_response) {
            let mut seen_here: HashSet<&str> = HashSet::new();
            let entries: Vec<SentenceEntry<'_>> = candidates
                .iter()
                .filter_map(|candidate| {
                    let title = candidate.title()?;
                    if recommended_titles.contains(title) || !seen_here.insert(title) {
                        return None;
                    }
                    let lowered = title.to_lowercase();
                    let exact = sentence.contains(&lowered);
                    Some(SentenceEntry {
                        candidate,
                        title,
                        lowered,
                        exact,
                    })
                })
                .collect();

            if entries.iter().any(|e| !e.exact) {
                let texts = std::iter::once(sentence)
                    .chain(entries.iter().filter(|e| !e.exact).map(|e| e.lowered.as_str()));
                self.fill_cache(&mut cache, texts).await?;
            }

            let mut accepted: Vec<(f32, &SentenceEntry<'_>)> = Vec::new();
            for entry in &entries {
                let score = if entry.exact {
                    1.0
                } else {
                    match (cache.get(sentence), cache.get(&entry.lowered)) {
                        (Some(a), Some(b)) => cosine_similarity(a, b),
                        _ => 0.0,
                    }
                };
                debug!(title = entry.title, score, "candidate scored");
                if entry.exact || score > self.threshold {
                    accepted.push((score, entry));
                }
            }

            // Stable: equal scores keep encounter order.
            accepted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
            for (_, entry) in accepted {
                if recommended_titles.insert(entry.title) {
                    recommended.push(entry.candidate.clone());
                }
            }
        }

        Ok(recommended)
    }
}

/// Matcher that delegates to the lookup service's matching endpoint.
#[derive(Clone, Debug)]
pub struct RemoteMatcher {
    client: LookupServiceClient,
    threshold: f32,
}

impl RemoteMatcher {
    /// Creates a remote matcher with the default threshold.
    pub fn new(client: LookupServiceClient) -> Self {
        Self {
            client,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

#[async_trait]
impl ItemMatcher for RemoteMatcher {
    async fn recommended_items(
        &self,
        response: &str,
        candidates: &[CandidateDocument],
    ) -> Result<Vec<CandidateDocument>, SimulationError> {
        if candidates.is_empty() || response.trim().is_empty() {
            return Ok(Vec::new());
        }
        match self
            .client
            .find_recommended_items(candidates, response, self.threshold)
            .await
        {
            Ok(items) => Ok(items),
            Err(e) => {
                error!(error = %e, "remote recommendation matching failed");
                Ok(Vec::new())
            }
        }
    }
}

/// Splits text into trimmed, non-empty sentences.
///
/// A sentence ends at `.`, `!` or `?` followed by whitespace (or the end of
/// the text), and at every line break. Decimal points such as `13.3` do not
/// end a sentence.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        let end = match ch {
            '\n' => Some(idx),
            '.' | '!' | '?' => match chars.peek() {
                None => Some(idx + ch.len_utf8()),
                Some((_, next)) if next.is_whitespace() => Some(idx + ch.len_utf8()),
                _ => None,
            },
            _ => None,
        };
        if let Some(end) = end {
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Cosine similarity of two vectors; zero when either has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
