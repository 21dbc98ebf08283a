//! Embedding provider abstraction and vector utilities.
//!
//! Defines the [`Embedder`] trait and one built-in implementation:
//! - **[`HashEmbedder`]**: deterministic FNV-1a bag-of-words vectors. Not
//!   semantic, but needs no model files and makes lexical-overlap
//!   retrieval and the embedding pipeline testable offline.
//!
//! Vectors are stored as little-endian `f32` blobs:
//! - [`vec_to_blob`] / [`blob_to_vec`] convert between the two forms
//! - [`cosine_similarity`] ranks stored vectors against a query
//!
//! [`embed_pending`] keeps the `embeddings` table current: it finds items
//! whose embedding for the embedder's model version is missing or was
//! computed from older content, and attaches fresh vectors in batches.

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::models::Item;
use crate::store::Store;

/// An embedding backend.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier stored alongside every vector this embedder produces.
    fn model_version(&self) -> &str;

    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Build the embedder named by `config.provider`. `Ok(None)` when embeddings
/// are disabled.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Option<Box<dyn Embedder>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "hash" => {
            if config.dims == 0 {
                bail!("embedding.dims must be > 0");
            }
            Ok(Some(Box::new(HashEmbedder::new(
                config.dims,
                config.model_version.clone(),
            ))))
        }
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Embed a single query string.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let mut vectors = embedder.embed(&[text.to_string()]).await?;
    match vectors.pop() {
        Some(v) if vectors.is_empty() => Ok(v),
        _ => bail!("embedder returned an unexpected number of vectors"),
    }
}

// ── Hash embedder ──────────────────────────────────────────────────────

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Tokens shorter than this carry no signal.
const MIN_TOKEN_LEN: usize = 2;

/// FNV-1a modular projection: each lowercase alphanumeric token adds ±1 to
/// one dimension; the result is L2-normalized.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
    model_version: String,
}

impl HashEmbedder {
    pub fn new(dims: usize, model_version: impl Into<String>) -> Self {
        Self {
            dims: dims.max(1),
            model_version: model_version.into(),
        }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dims];
        for token in tokenize(text) {
            let hash = fnv1a(token.as_bytes());
            let index = (hash % self.dims as u64) as usize;
            let sign = if hash >> 63 == 1 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }
        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_version(&self) -> &str {
        &self.model_version
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .map(str::to_lowercase)
        .collect()
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

// ── Pending-embedding pipeline ─────────────────────────────────────────

/// Outcome of one [`embed_pending`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedReport {
    pub pending: usize,
    pub embedded: usize,
    pub failed: usize,
}

/// Text an item is embedded from.
pub fn embedding_text(item: &Item) -> String {
    format!("{}\n{}", item.title, item.content)
}

/// Embed up to `limit` items lacking a current vector for the embedder's
/// model version.
///
/// A failing embedder batch is counted and skipped; storage errors abort.
pub async fn embed_pending(
    store: &Store,
    embedder: &dyn Embedder,
    batch_size: usize,
    limit: i64,
) -> Result<EmbedReport> {
    let model_version = embedder.model_version().to_string();
    let pending = store.items_missing_embedding(&model_version, limit).await?;

    let mut report = EmbedReport {
        pending: pending.len(),
        ..EmbedReport::default()
    };

    for batch in pending.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(embedding_text).collect();
        match embedder.embed(&texts).await {
            Ok(vectors) if vectors.len() == batch.len() => {
                for (item, vector) in batch.iter().zip(vectors.iter()) {
                    store
                        .attach_embedding(item.id, &vec_to_blob(vector), &model_version)
                        .await?;
                    report.embedded += 1;
                }
            }
            Ok(vectors) => {
                tracing::warn!(
                    expected = batch.len(),
                    got = vectors.len(),
                    "embedder returned wrong batch size"
                );
                report.failed += batch.len();
            }
            Err(e) => {
                tracing::warn!(error = %e, "embedding batch failed");
                report.failed += batch.len();
            }
        }
    }

    Ok(report)
}

// ── Vector utilities ───────────────────────────────────────────────────

/// Cosine similarity in `[-1, 1]`; `0.0` for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Trailing bytes that do not form a whole `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
