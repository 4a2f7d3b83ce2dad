use queuedupe::cache::{CacheError, DocumentCache, FsLoader};
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

fn write_docs(dir: &std::path::Path, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let path = dir.join(format!("doc{i}.pdf"));
            fs::write(&path, format!("%PDF document {i}")).unwrap();
            path
        })
        .collect()
}

#[test]
fn test_cache_sliding_window() {
    let dir = tempdir().unwrap();
    let paths = write_docs(dir.path(), 5);
    let url_for = |id: &str| -> Result<String, CacheError> {
        let idx: usize = id.trim_start_matches("doc").parse().unwrap();
        Ok(paths[idx].to_string_lossy().into_owned())
    };
    let mut cache = DocumentCache::new(FsLoader::new());

    // Walk through the documents one by one, preloading neighbours.
    for i in 0usize..5 {
        let id = format!("doc{i}");
        let url = url_for(&id).unwrap();
        let doc = cache.get_document(&id, Some(&url)).unwrap();
        assert_eq!(doc.as_slice(), format!("%PDF document {i}").as_bytes());

        let prev = i.checked_sub(1).map(|p| format!("doc{p}"));
        let next = (i + 1 < 5).then(|| format!("doc{}", i + 1));
        cache.preload_adjacent(prev.as_deref(), next.as_deref(), url_for);
        assert!(cache.stats().size <= 3);
    }

    let stats = cache.stats();
    assert_eq!(stats.documents, vec!["doc2", "doc3", "doc4"]);
    // doc0 was loaded directly; every later document was preloaded.
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 4);
    assert_eq!(stats.hit_rate, "80.0%");
}

#[test]
fn test_cache_file_url_prefix() {
    let dir = tempdir().unwrap();
    let paths = write_docs(dir.path(), 1);
    let url = format!("file://{}", paths[0].display());
    let mut cache = DocumentCache::new(FsLoader::new());

    let doc = cache.get_document("doc0", Some(&url)).unwrap();
    assert!(!doc.is_empty());
    assert!(cache.has_document("doc0"));
}

#[test]
fn test_cache_missing_file_is_io_error() {
    let dir = tempdir().unwrap();
    let url = dir.path().join("gone.pdf").to_string_lossy().into_owned();
    let mut cache = DocumentCache::new(FsLoader::new());

    let err = cache.get_document("gone", Some(&url)).unwrap_err();
    assert!(matches!(err, CacheError::Io { .. }));
    assert!(!cache.has_document("gone"));
}

#[test]
fn test_cache_unsupported_preload_is_skipped() {
    let dir = tempdir().unwrap();
    let exe = dir.path().join("setup.exe");
    fs::write(&exe, b"MZ").unwrap();
    let loader = FsLoader::new().with_allowed_extensions(vec!["pdf".to_string()]);
    let mut cache = DocumentCache::new(loader);

    let loaded = cache.preload_adjacent(None, Some("setup"), |_| {
        Ok(exe.to_string_lossy().into_owned())
    });

    assert_eq!(loaded, 0);
    assert_eq!(cache.stats().size, 0);
}

#[test]
fn test_cache_metadata_survives_reload() {
    let dir = tempdir().unwrap();
    let paths = write_docs(dir.path(), 1);
    let url = paths[0].to_string_lossy().into_owned();
    let mut cache = DocumentCache::new(FsLoader::new());

    cache.set_metadata("doc0", serde_json::json!({"pages": 3}));
    assert!(!cache.has_document("doc0"));
    cache.get_document("doc0", Some(&url)).unwrap();

    assert!(cache.has_document("doc0"));
    assert_eq!(cache.get_metadata("doc0").unwrap()["pages"], 3);

    cache.clear_cache();
    assert_eq!(cache.stats().size, 0);
    assert_eq!(cache.stats().hit_rate, "0%");
}
