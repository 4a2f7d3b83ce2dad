use clap::Parser;
use filetime::{set_file_mtime, FileTime};
use queuedupe::cli::Cli;
use queuedupe::error::ExitCode;
use queuedupe::queue::{QueueConfig, RowStatus, UploadQueue};
use queuedupe::scanner::{collect_sources, FileSource, WalkerConfig};
use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::tempdir;

fn write(path: &Path, content: &[u8], mtime_secs: i64) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
    set_file_mtime(path, FileTime::from_unix_time(mtime_secs, 0)).unwrap();
}

#[test]
fn test_collect_nested_folders() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("matter");
    write(&root.join("a.pdf"), b"a", 1_700_000_000);
    write(&root.join("sub/b.pdf"), b"b", 1_700_000_000);

    let (sources, errors) = collect_sources(&[root], &WalkerConfig::default());

    assert!(errors.is_empty());
    let mut paths: Vec<&str> = sources.iter().map(|s| s.relative_path()).collect();
    paths.sort_unstable();
    assert_eq!(paths, vec!["matter/a.pdf", "matter/sub/b.pdf"]);
    let b = sources.iter().find(|s| s.name() == "b.pdf").unwrap();
    assert_eq!(b.last_modified(), 1_700_000_000_000);
    assert_eq!(b.size(), 1);
}

#[test]
fn test_collect_skips_hidden() {
    let dir = tempdir().unwrap();
    write(&dir.path().join(".cache/x.pdf"), b"x", 1);
    write(&dir.path().join(".hidden.pdf"), b"h", 1);
    write(&dir.path().join("shown.pdf"), b"s", 1);

    let config = WalkerConfig {
        skip_hidden: true,
        ..WalkerConfig::default()
    };
    let (sources, _) = collect_sources(&[dir.path().to_path_buf()], &config);

    let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["shown.pdf"]);
}

#[test]
fn test_collect_missing_root_is_reported() {
    let dir = tempdir().unwrap();
    let (sources, errors) = collect_sources(&[dir.path().join("nope")], &WalkerConfig::default());
    assert!(sources.is_empty());
    assert_eq!(errors.len(), 1);
}

#[test]
fn test_collect_cancelled() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("a.pdf"), b"a", 1);
    let config = WalkerConfig::default().with_cancel_flag(Arc::new(AtomicBool::new(true)));

    let (sources, _) = collect_sources(&[dir.path().to_path_buf()], &config);
    assert!(sources.is_empty());
}

#[test]
fn test_disk_drop_end_to_end() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("inbox");
    // Same file saved into two folders keeps name and mtime.
    write(&root.join("2024/engagement.pdf"), b"engagement letter", 1_700_000_000);
    write(&root.join("archive/engagement.pdf"), b"engagement letter", 1_700_000_000);
    // Re-saved under another name later.
    write(&root.join("2024/engagement-final.pdf"), b"engagement letter", 1_700_000_500);
    write(&root.join("2024/invoice.pdf"), b"invoice", 1_700_000_000);

    let (sources, errors) = collect_sources(&[root], &WalkerConfig::default());
    assert!(errors.is_empty());

    let mut queue = UploadQueue::new(QueueConfig::default().with_tenant_id("firm-1"));
    queue.add_files_to_queue(sources).unwrap();

    let progress = queue.progress();
    assert_eq!(progress.files_ready, 2);
    assert_eq!(progress.files_copies, 1);
    assert_eq!(progress.files_duplicates, 1);

    let dup = queue.rows().iter().find(|r| r.is_duplicate()).unwrap();
    assert_eq!(dup.name, "engagement.pdf");
    assert_eq!(dup.folder_path, "/inbox/archive");
    assert!(dup.content_hash.is_none());
    let copy = queue.rows().iter().find(|r| r.is_copy()).unwrap();
    let primary = queue.row(copy.reference_file_id.unwrap()).unwrap();
    assert_eq!(primary.status, RowStatus::Ready);
    assert_eq!(primary.content_hash, copy.content_hash);
    let invoice = queue.rows().iter().find(|r| r.name == "invoice.pdf").unwrap();
    assert_eq!(invoice.status, RowStatus::Ready);
    assert_eq!(invoice.folder_path, "/inbox/2024");
}

#[test]
fn test_run_app_json_ingest() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("a.pdf"), b"same", 1_700_000_000);
    write(&dir.path().join("b.pdf"), b"same", 1_700_000_100);

    let cli = Cli::try_parse_from([
        "queuedupe".to_string(),
        "--quiet".to_string(),
        "ingest".to_string(),
        dir.path().to_string_lossy().into_owned(),
        "--tenant".to_string(),
        "firm-1".to_string(),
        "--output".to_string(),
        "json".to_string(),
        "--no-verify".to_string(),
    ])
    .unwrap();

    let code = queuedupe::run_app(cli).unwrap();
    assert_eq!(code, ExitCode::Success);
}

#[test]
fn test_run_app_nothing_uploadable() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("only.tmp"), b"scratch", 1_700_000_000);

    let cli = Cli::try_parse_from([
        "queuedupe".to_string(),
        "--quiet".to_string(),
        "ingest".to_string(),
        dir.path().to_string_lossy().into_owned(),
        "--tenant".to_string(),
        "firm-1".to_string(),
        "--output".to_string(),
        "csv".to_string(),
    ])
    .unwrap();

    let code = queuedupe::run_app(cli).unwrap();
    assert_eq!(code, ExitCode::NothingToUpload);
}
