//! lexfind-embed
//!
//! Sentence embeddings for queries. `MiniLmEmbedder` runs
//! all-MiniLM-L6-v2 through candle; `HashingEmbedder` is a deterministic
//! stand-in for offline development and tests. `EmbeddingProvider` is the
//! process-wide handle the retrieval engine holds.

pub mod device;
pub mod pool;
pub mod provider;
pub mod tokenize;

use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;

use lexfind_core::config::{expand_path, EmbeddingSettings};
use lexfind_core::traits::Embedder;

pub use device::select_device;
pub use pool::masked_mean_l2;
pub use provider::EmbeddingProvider;
pub use tokenize::tokenize_on_device;

pub struct MiniLmEmbedder { model: BertModel, tokenizer: Tokenizer, device: Device, dim: usize, max_len: usize }

impl MiniLmEmbedder {
    /// Load tokenizer, config and weights from a sentence-transformers export.
    /// Weights are read from `model.safetensors`, or `pytorch_model.bin` when
    /// only the pickle is present. Runs one warm-up pass to learn the output width.
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = select_device();
        tracing::info!(dir = %model_dir.display(), "loading MiniLM embedding model");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let config: BertConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let safetensors = model_dir.join("model.safetensors");
        let weights_map: std::collections::HashMap<String, candle_core::Tensor> = if safetensors.exists() {
            candle_core::safetensors::load(&safetensors, &device)?
        } else {
            candle_core::pickle::read_all(model_dir.join("pytorch_model.bin"))?.into_iter().collect()
        };
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = BertModel::load(vb, &config)?;
        let mut embedder = Self { model, tokenizer, device, dim: 0, max_len };
        embedder.dim = embedder.embed_text("warm up").map(|v| v.len())?;
        tracing::info!(dim = embedder.dim, "embedding model loaded");
        Ok(embedder)
    }

    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_on_device(&self.tokenizer, text, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let emb = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1::<f32>()?;
        let elapsed = start.elapsed();
        if elapsed.as_millis() > 100 { tracing::debug!(?elapsed, "slow embedding"); }
        Ok(emb)
    }
}

impl Embedder for MiniLmEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> { texts.iter().map(|t| self.embed_text(t)).collect() }
}

/// Bag-of-words vectors from xxHash buckets, L2-normalized. Same text, same
/// vector; texts sharing words have positive cosine.
pub struct HashingEmbedder { dim: usize }

impl HashingEmbedder { pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } } }

impl HashingEmbedder {
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher}; use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        let lowered = text.to_lowercase();
        for token in lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hasher = XxHash64::with_seed(0); token.hash(&mut hasher); let h = hasher.finish();
            let idx = (h as usize) % self.dim; let val = 0.5 + (((h >> 32) as u32) as f32) / (u32::MAX as f32) * 0.5;
            v[idx] += val;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt();
        if norm > 0.0 { for x in &mut v { *x /= norm; } }
        v
    }
}

impl Embedder for HashingEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> { Ok(texts.iter().map(|t| self.embed_text(t)).collect()) }
}

fn fake_requested(settings: &EmbeddingSettings) -> bool {
    settings.use_fake || std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Box<dyn Embedder>> {
    if fake_requested(settings) { tracing::info!("using HashingEmbedder"); return Ok(Box::new(HashingEmbedder::new(settings.dimension))); }
    let model_dir = resolve_model_dir(&settings.model_dir)?;
    Ok(Box::new(MiniLmEmbedder::load(&model_dir, settings.max_len)?))
}

fn resolve_model_dir(configured: &str) -> Result<PathBuf> {
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) { let p = expand_path(&dir); if p.exists() { tracing::info!(dir = %p.display(), "model dir from {}", var); return Ok(p); } }
    }
    let p = expand_path(configured);
    if p.exists() { return Ok(p); }
    Err(anyhow!("Could not locate embedding model directory {}", p.display()))
}
