use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use queuedupe::cache::FsLoader;
use queuedupe::config::{Config, ENV_PREFIX};
use queuedupe::duplicates::IngestMode;
use queuedupe::scanner::HashAlgorithm;
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Use figment directly without Env to avoid interference from other tests
    let config = Config::extract(Figment::from(Serialized::defaults(Config::default()))).unwrap();
    assert_eq!(config.phase1_size, 200);
    assert_eq!(config.batch_size, 1000);
    assert_eq!(config.io_threads, 4);
    assert_eq!(config.hash_algorithm, HashAlgorithm::Xxh3);
    assert_eq!(config.ingest_mode, IngestMode::Layered);
    assert!(config.tenant_id.is_none());
    assert_eq!(config.verify_debounce(), Duration::from_millis(100));
    assert_eq!(config.removal_animation(), Duration::from_millis(500));
}

#[test]
fn test_config_load_from_env() {
    std::env::set_var("QUEUEDUPE_BATCH_SIZE", "250");
    std::env::set_var("QUEUEDUPE_INGEST_MODE", "prefilter");

    let figment = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));
    let config = Config::extract(figment).unwrap();

    assert_eq!(config.batch_size, 250);
    assert_eq!(config.ingest_mode, IngestMode::Prefilter);

    // Clean up
    std::env::remove_var("QUEUEDUPE_BATCH_SIZE");
    std::env::remove_var("QUEUEDUPE_INGEST_MODE");
}

#[test]
fn test_config_load_from_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
phase1_size = 50
hash_algorithm = "blake3"
tenant_id = "firm-7"
unsupported_extensions = ["lnk", "tmp", "ds_store"]
verify_debounce_ms = 10
"#,
    )
    .unwrap();

    let figment =
        Figment::from(Serialized::defaults(Config::default())).merge(Toml::file(&config_path));
    let config = Config::extract(figment).unwrap();

    assert_eq!(config.phase1_size, 50);
    assert_eq!(config.hash_algorithm, HashAlgorithm::Blake3);
    assert_eq!(config.tenant_id.as_deref(), Some("firm-7"));
    assert_eq!(config.unsupported_extensions.len(), 3);
    assert_eq!(config.verify_debounce(), Duration::from_millis(10));
    // Untouched keys keep their defaults.
    assert_eq!(config.batch_size, 1000);
}

#[test]
fn test_config_feeds_queue() {
    let config = Config {
        phase1_size: 3,
        batch_size: 7,
        tenant_id: Some("firm-2".to_string()),
        ingest_mode: IngestMode::Prefilter,
        ..Config::default()
    };
    let queue_config = config.to_queue_config();
    assert_eq!(queue_config.phase1_size, 3);
    assert_eq!(queue_config.batch_size, 7);
    assert_eq!(queue_config.tenant_id.as_deref(), Some("firm-2"));
    assert_eq!(queue_config.ingest_mode, IngestMode::Prefilter);
}

#[test]
fn test_config_save_and_reload() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("nested").join("config.toml");
    let config = Config {
        io_threads: 2,
        tenant_id: Some("firm-3".to_string()),
        ..Config::default()
    };

    config.save_to(&path).unwrap();
    let figment = Figment::from(Serialized::defaults(Config::default())).merge(Toml::file(&path));
    let loaded = Config::extract(figment).unwrap();

    assert_eq!(loaded.io_threads, 2);
    assert_eq!(loaded.tenant_id.as_deref(), Some("firm-3"));
}

#[test]
fn test_config_invalid_type_is_an_error() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("config.toml");
    fs::write(&path, "batch_size = \"lots\"\n").unwrap();

    let figment = Figment::from(Serialized::defaults(Config::default())).merge(Toml::file(&path));
    assert!(Config::extract(figment).is_err());
}

#[test]
fn test_config_load_falls_back_to_defaults() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("config.toml");
    fs::write(&path, "io_threads = \"many\"\n").unwrap();

    let config = Config::load(Some(&path));
    assert_eq!(config.io_threads, 4);
}

#[test]
fn test_config_sizes_document_cache() {
    let dir = tempdir().unwrap();
    let config = Config {
        document_cache_size: 2,
        ..Config::default()
    };
    let mut cache = config.document_cache(FsLoader::new());

    for i in 0..4 {
        let path = dir.path().join(format!("doc{i}.pdf"));
        fs::write(&path, b"%PDF").unwrap();
        cache
            .get_document(&format!("doc{i}"), Some(&path.to_string_lossy()))
            .unwrap();
    }

    let stats = cache.stats();
    assert_eq!(stats.max_size, 2);
    assert_eq!(stats.size, 2);
}
