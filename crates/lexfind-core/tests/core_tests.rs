use figment::providers::{Format, Toml};
use figment::Figment;

use lexfind_core::config::{expand_path, resolve_with_base, Config, StoreBackend};
use lexfind_core::types::MatchMethod;
use lexfind_core::Error;

#[test]
fn empty_configuration_uses_documented_defaults() {
    let settings = Config::from_figment(Figment::new()).settings().expect("settings");

    assert!((settings.retrieval.fast_path_threshold - 0.45).abs() < 1e-6);
    assert!((settings.retrieval.agreement_bonus - 0.2).abs() < 1e-6);
    assert_eq!(settings.retrieval.fused_limit, 40);
    assert_eq!(settings.retrieval.max_alternatives, 5);
    assert!((settings.retrieval.weights.weight(MatchMethod::Fuzzy) - 1.2).abs() < 1e-6);
    assert!((settings.search.vector_floor - 0.35).abs() < 1e-6);
    assert!((settings.search.fuzzy_floor - 0.3).abs() < 1e-6);
    assert_eq!(settings.search.legacy_min_hits, 3);
    assert_eq!(settings.normalizer.max_keywords, 8);
    assert_eq!(settings.normalizer.retry.max_attempts, 1, "no retries at the normalizer by default");
    assert_eq!(settings.embedding.dimension, 384);
    assert_eq!(settings.store.backend, StoreBackend::Postgres);
    assert_eq!((settings.store.pool_min, settings.store.pool_max), (1, 20));
    assert!(settings.tunnel.is_none());
}

#[test]
fn toml_overrides_nested_tunables() {
    let toml = r#"
        [retrieval]
        fast_path_threshold = 0.6

        [retrieval.weights]
        legacy = 0.25

        [store]
        backend = "snapshot"
        snapshot_path = "corpus.jsonl"

        [tunnel]
        bastion_host = "10.0.0.1"
        remote_host = "db.internal"
        local_port = 6543
    "#;
    let settings = Config::from_figment(Figment::new().merge(Toml::string(toml))).settings().expect("settings");

    assert!((settings.retrieval.fast_path_threshold - 0.6).abs() < 1e-6);
    assert!((settings.retrieval.weights.legacy - 0.25).abs() < 1e-6);
    assert!((settings.retrieval.weights.vector - 1.0).abs() < 1e-6, "untouched weights keep defaults");
    assert_eq!(settings.store.backend, StoreBackend::Snapshot);
    let tunnel = settings.tunnel.expect("tunnel section");
    assert_eq!(tunnel.local_port, 6543);
    assert_eq!(tunnel.remote_port, 5432);
    assert_eq!(tunnel.ssh_binary, "ssh");
}

#[test]
fn out_of_range_values_are_rejected() {
    for toml in [
        "[retrieval]\nfast_path_threshold = 1.5",
        "[store]\npool_min = 5\npool_max = 2",
        "[normalizer.retry]\nmax_attempts = 0",
        "[embedding]\ndimension = 0",
    ] {
        let err = Config::from_figment(Figment::new().merge(Toml::string(toml))).settings().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)), "{toml} -> {err}");
    }
}

#[test]
fn get_reads_single_keys() {
    let config = Config::from_figment(Figment::new().merge(Toml::string("[search]\nfuzzy_limit = 7")));
    let limit: usize = config.get("search.fuzzy_limit").expect("key");
    assert_eq!(limit, 7);
    assert!(config.get::<usize>("search.missing").is_err());
}

#[test]
fn paths_expand_env_and_resolve_against_base() {
    std::env::set_var("LEXFIND_TEST_ROOT", "/srv/lexfind");
    assert_eq!(expand_path("${LEXFIND_TEST_ROOT}/models"), std::path::PathBuf::from("/srv/lexfind/models"));

    let tmp = tempfile::tempdir().expect("tmp");
    assert_eq!(resolve_with_base(tmp.path(), "corpus.json"), tmp.path().join("corpus.json"));
    assert_eq!(resolve_with_base(tmp.path(), "/abs/corpus.json"), std::path::PathBuf::from("/abs/corpus.json"));
}
