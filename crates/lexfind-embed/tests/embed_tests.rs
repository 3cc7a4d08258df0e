use lexfind_core::config::EmbeddingSettings;
use lexfind_core::traits::Embedder;
use lexfind_embed::{get_default_embedder, EmbeddingProvider, HashingEmbedder};

fn cosine(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

#[test]
fn hashing_embedder_shapes_and_determinism() {
    let settings = EmbeddingSettings { use_fake: true, ..EmbeddingSettings::default() };
    let embedder = get_default_embedder(&settings).expect("embedder");
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 384, "embedding dim follows settings");

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[test]
fn shared_words_raise_cosine() {
    let e = HashingEmbedder::new(384);
    let a = e.embed_text("Rental Agreement");
    let b = e.embed_text("rental agreement for apartment");
    let c = e.embed_text("power of attorney");
    assert!(cosine(&a, &b) > cosine(&a, &c));
}

#[test]
fn provider_returns_vector_of_configured_width() {
    let provider = EmbeddingProvider::new(Box::new(HashingEmbedder::new(16)), 16);
    assert!(provider.is_available());
    let v = provider.embed("lease").expect("embedding");
    assert_eq!(v.len(), 16);
}

#[test]
fn provider_with_mismatched_width_is_unavailable() {
    let provider = EmbeddingProvider::new(Box::new(HashingEmbedder::new(8)), 384);
    assert!(!provider.is_available());
    assert!(provider.embed("lease").is_none());
}

#[test]
fn missing_model_dir_degrades_to_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let settings = EmbeddingSettings {
        model_dir: dir.path().join("nope").to_string_lossy().into_owned(),
        use_fake: false,
        ..EmbeddingSettings::default()
    };
    // APP_MODEL_DIR may point at a real model on dev machines
    if std::env::var("APP_MODEL_DIR").is_ok() || std::env::var("MODEL_DIR").is_ok() || std::env::var("APP_USE_FAKE_EMBEDDINGS").is_ok() { return; }
    let provider = EmbeddingProvider::from_settings(&settings);
    assert!(!provider.is_available());
    assert!(provider.embed("anything").is_none());
}
