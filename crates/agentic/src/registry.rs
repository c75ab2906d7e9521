//! Source registry: run-wide deduplication and citation numbering.

use crate::types::{Chunk, IndexedSource, SourceKey};
use std::collections::{HashMap, HashSet};

/// Assigns every distinct chunk a stable 1-based citation index.
///
/// Indices are handed out in first-seen order and never change for the
/// lifetime of the run, so two sub-questions that retrieve the same chunk
/// cite the same number.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    index_map: HashMap<SourceKey, usize>,
    sources: Vec<IndexedSource>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the chunks of one tool call.
    ///
    /// Returns normalized copies (index attached) in retrieval order, without
    /// repeats within the call. Chunks without any usable key are dropped.
    pub fn register(&mut self, chunks: &[Chunk]) -> Vec<IndexedSource> {
        let mut in_call = HashSet::new();
        let mut registered = Vec::new();

        for chunk in chunks {
            let Some(key) = SourceKey::for_chunk(chunk) else {
                tracing::debug!("Discarding chunk without article, repository or embedding id");
                continue;
            };

            let index = match self.index_map.get(&key) {
                Some(&index) => index,
                None => {
                    let index = self.sources.len() + 1;
                    self.index_map.insert(key.clone(), index);
                    self.sources.push(IndexedSource {
                        index,
                        key: key.clone(),
                        chunk: chunk.clone(),
                    });
                    index
                }
            };

            if in_call.insert(index) {
                registered.push(IndexedSource {
                    index,
                    key,
                    chunk: chunk.clone(),
                });
            }
        }

        registered
    }

    /// Every registered source, in index order.
    pub fn all_sources(&self) -> &[IndexedSource] {
        &self.sources
    }

    /// Embedding ids of registered sources, most recent first.
    pub fn recent_ids(&self, limit: usize) -> Vec<String> {
        self.sources
            .iter()
            .rev()
            .filter_map(|s| s.chunk.id.clone())
            .take(limit)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
