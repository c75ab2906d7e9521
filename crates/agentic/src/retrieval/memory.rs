//! In-memory lexical retriever.
//!
//! Scores chunks by the share of query terms they contain. Not a substitute
//! for embeddings, but deterministic and good enough for offline runs over an
//! exported corpus.

use super::Retriever;
use crate::types::{Chunk, ExpandArgs, SearchArgs, SourceKey};
use feedmind_core::{AppError, AppResult};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Score multiplier for chunks pulled in as neighbours of a seed.
const NEIGHBOUR_DECAY: f32 = 0.9;

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "an", "as", "are", "was", "were", "for", "to", "of", "in",
    "and", "or", "but", "with", "by", "from", "this", "that", "be", "it", "its", "what", "how",
    "does", "do", "why", "who",
];

/// Retriever over a fixed set of chunks.
#[derive(Debug, Default)]
pub struct InMemoryRetriever {
    chunks: Vec<Chunk>,
}

impl InMemoryRetriever {
    /// Create a retriever over the given chunks.
    pub fn from_chunks(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    /// Load a corpus from a JSONL file, one chunk per line.
    pub fn from_jsonl(path: &Path) -> AppResult<Self> {
        let file = File::open(path).map_err(|e| {
            AppError::Retrieval(format!("Failed to open corpus {:?}: {}", path, e))
        })?;

        let reader = BufReader::new(file);
        let mut chunks = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| {
                AppError::Retrieval(format!("Failed to read line {}: {}", line_num + 1, e))
            })?;

            if line.trim().is_empty() {
                continue;
            }

            let chunk: Chunk = serde_json::from_str(&line).map_err(|e| {
                AppError::Retrieval(format!(
                    "Failed to parse line {} in {:?}: {}",
                    line_num + 1,
                    path,
                    e
                ))
            })?;

            chunks.push(chunk);
        }

        tracing::debug!("Loaded {} chunks from {:?}", chunks.len(), path);
        Ok(Self::from_chunks(chunks))
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunks scoring at least `min_score` against `query`, in corpus order.
    fn score_all(&self, query: &str, min_score: f32) -> Vec<Chunk> {
        let terms = tokenize(query);
        if terms.is_empty() {
            return Vec::new();
        }

        self.chunks
            .iter()
            .filter_map(|chunk| {
                let score = lexical_score(&terms, chunk);
                (score > 0.0 && score >= min_score).then(|| Chunk {
                    score,
                    ..chunk.clone()
                })
            })
            .collect()
    }

    /// Chunks of the same article/repository within `window` positions of a
    /// seed. A neighbour scores at least the seed's (decayed) query score.
    fn neighbours(&self, seed_ids: &[String], seed_query: &str, window: u32) -> Vec<Chunk> {
        let terms = tokenize(seed_query);
        let seeds: Vec<&Chunk> = self
            .chunks
            .iter()
            .filter(|c| c.id.as_ref().is_some_and(|id| seed_ids.contains(id)))
            .collect();

        let mut found = Vec::new();
        for seed in seeds {
            let inherited = if terms.is_empty() {
                0.0
            } else {
                lexical_score(&terms, seed) * NEIGHBOUR_DECAY
            };
            for candidate in &self.chunks {
                if std::ptr::eq(candidate, seed) || !same_document(candidate, seed) {
                    continue;
                }
                if candidate.chunk_index.abs_diff(seed.chunk_index) <= window {
                    let own = if terms.is_empty() {
                        0.0
                    } else {
                        lexical_score(&terms, candidate)
                    };
                    found.push(Chunk {
                        score: own.max(inherited),
                        ..candidate.clone()
                    });
                }
            }
        }
        found
    }
}

fn same_document(a: &Chunk, b: &Chunk) -> bool {
    (a.article_id.is_some() && a.article_id == b.article_id)
        || (a.repository_id.is_some() && a.repository_id == b.repository_id)
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() > 1 && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

fn lexical_score(terms: &HashSet<String>, chunk: &Chunk) -> f32 {
    let haystack = tokenize(&format!("{} {}", chunk.title, chunk.content));
    let hits = terms.iter().filter(|t| haystack.contains(*t)).count();
    hits as f32 / terms.len() as f32
}

/// Deduplicate by source key (first wins), sort best first, keep `top_k`.
fn rank(candidates: Vec<Chunk>, min_score: f32, top_k: usize) -> Vec<Chunk> {
    let mut seen = HashSet::new();
    let mut ranked: Vec<Chunk> = candidates
        .into_iter()
        .filter(|c| c.score >= min_score)
        .filter(|c| match SourceKey::for_chunk(c) {
            Some(key) => seen.insert(key),
            None => true,
        })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked.truncate(top_k);
    ranked
}

#[async_trait::async_trait]
impl Retriever for InMemoryRetriever {
    fn name(&self) -> &str {
        "memory"
    }

    async fn search(&self, args: &SearchArgs) -> AppResult<Vec<Chunk>> {
        let candidates = self.score_all(&args.query, args.min_score);
        Ok(rank(candidates, args.min_score, args.top_k))
    }

    async fn expand(&self, args: &ExpandArgs) -> AppResult<Vec<Chunk>> {
        let mut candidates = self.neighbours(&args.seed_ids, &args.seed_query, args.window);
        candidates.extend(self.score_all(&args.seed_query, args.min_score));
        Ok(rank(candidates, args.min_score, args.top_k))
    }
}
