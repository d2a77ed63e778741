//! Per-user store of the user's own past messages, used to make suggested
//! lines sound like them.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{domain::UserId, errors::Error, model::Embedder, users::write_atomic, Result};

pub const CHUNK_SIZE: usize = 1000;
pub const CHUNK_OVERLAP: usize = 200;
pub const SUGGESTION_MARKER: &str = "you should say";

/// Split `text` on `separator` and greedily merge the pieces into chunks of at
/// most `chunk_size` characters, carrying up to `overlap` characters of
/// trailing pieces into the next chunk.
///
/// A single piece longer than `chunk_size` becomes its own oversized chunk.
pub fn split_text(text: &str, separator: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let pieces: Vec<&str> = if separator.is_empty() {
        vec![text]
    } else {
        text.split(separator).filter(|s| !s.is_empty()).collect()
    };
    let sep_len = separator.chars().count();

    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut total = 0usize;

    for piece in pieces {
        let len = piece.chars().count();
        let joiner = |current: &[&str]| if current.is_empty() { 0 } else { sep_len };

        if total + len + joiner(&current) > chunk_size && !current.is_empty() {
            push_joined(&mut chunks, &current, separator);
            while total > overlap || (total > 0 && total + len + joiner(&current) > chunk_size) {
                let first = current.remove(0).chars().count();
                total -= first + joiner(&current);
            }
        }

        total += len + joiner(&current);
        current.push(piece);
    }
    push_joined(&mut chunks, &current, separator);
    chunks
}

fn push_joined(chunks: &mut Vec<String>, pieces: &[&str], separator: &str) {
    let joined = pieces.join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// A reply split around its first "you should say" (any case).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Suggestion<'a> {
    pub context: &'a str,
    pub marker: &'a str,
    pub suggestion: &'a str,
}

pub fn split_suggestion(response: &str) -> Option<Suggestion<'_>> {
    let idx = response.to_ascii_lowercase().find(SUGGESTION_MARKER)?;
    let end = idx + SUGGESTION_MARKER.len();
    Some(Suggestion {
        context: &response[..idx],
        marker: &response[idx..end],
        suggestion: &response[end..],
    })
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StyleChunk {
    text: String,
    vector: Vec<f32>,
}

/// Embedded style chunks per user, optionally mirrored to one JSON file per
/// user under a directory.
pub struct StyleStore {
    embedder: Arc<dyn Embedder>,
    dir: Option<PathBuf>,
    chunks: Mutex<HashMap<UserId, Vec<StyleChunk>>>,
}

impl StyleStore {
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            dir: None,
            chunks: Mutex::new(HashMap::new()),
        }
    }

    /// Load every `style_<user>.json` under `dir`.
    pub async fn open(embedder: Arc<dyn Embedder>, dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let mut chunks = HashMap::new();
        let mut rd = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = rd.next_entry().await? {
            let path = entry.path();
            let Some(user_id) = user_from_file_name(&path) else {
                continue;
            };
            match tokio::fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<Vec<StyleChunk>>(&bytes) {
                    Ok(list) => {
                        chunks.insert(user_id, list);
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable style file"),
                },
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable style file"),
            }
        }
        info!(dir = %dir.display(), users = chunks.len(), "loaded style stores");

        Ok(Self {
            embedder,
            dir: Some(dir),
            chunks: Mutex::new(chunks),
        })
    }

    pub async fn has_examples(&self, user_id: UserId) -> bool {
        self.chunks
            .lock()
            .await
            .get(&user_id)
            .is_some_and(|c| !c.is_empty())
    }

    /// Chunk, embed and store `text`. Returns the number of chunks added.
    pub async fn learn(&self, user_id: UserId, text: &str) -> Result<usize> {
        let pieces = split_text(text, "\n", CHUNK_SIZE, CHUNK_OVERLAP);
        if pieces.is_empty() {
            return Ok(0);
        }

        let vectors = self.embedder.embed(&pieces).await?;
        if vectors.len() != pieces.len() {
            return Err(Error::External(format!(
                "embedder returned {} vectors for {} inputs",
                vectors.len(),
                pieces.len()
            )));
        }

        let added = pieces.len();
        let mut all = self.chunks.lock().await;
        let mut list = all.get(&user_id).cloned().unwrap_or_default();
        list.extend(
            pieces
                .into_iter()
                .zip(vectors)
                .map(|(text, vector)| StyleChunk { text, vector }),
        );
        if let Some(dir) = &self.dir {
            let bytes = serde_json::to_vec(&list)?;
            write_atomic(&dir.join(format!("style_{}.json", user_id.0)), &bytes).await?;
        }
        let total = list.len();
        all.insert(user_id, list);
        debug!(user_id = user_id.0, added, total, "learned style chunks");
        Ok(added)
    }

    /// The `k` stored chunks closest to `query` by cosine similarity.
    pub async fn similar(&self, user_id: UserId, query: &str, k: usize) -> Result<Vec<String>> {
        if k == 0 || !self.has_examples(user_id).await {
            return Ok(Vec::new());
        }
        let query_vec = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::External("embedder returned no vector".to_string()))?;

        let all = self.chunks.lock().await;
        let Some(list) = all.get(&user_id) else {
            return Ok(Vec::new());
        };
        let mut scored: Vec<(f32, &StyleChunk)> = list
            .iter()
            .map(|c| (cosine(&query_vec, &c.vector), c))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored.into_iter().take(k).map(|(_, c)| c.text.clone()).collect())
    }
}

fn user_from_file_name(path: &Path) -> Option<UserId> {
    let name = path.file_name()?.to_str()?;
    let id = name.strip_prefix("style_")?.strip_suffix(".json")?;
    id.parse().ok().map(UserId)
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}
