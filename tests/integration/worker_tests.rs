use queuedupe::scanner::worker::{
    BatchResult, HashWorker, WorkerConfig, WorkerFile, WorkerRequest, WorkerResponse,
};
use queuedupe::scanner::MemoryFile;
use std::time::Duration;

fn worker() -> HashWorker {
    HashWorker::spawn(WorkerConfig {
        progress_throttle: Duration::ZERO,
        ..WorkerConfig::default()
    })
    .unwrap()
}

fn file(id: &str, name: &str, bytes: &[u8], mtime: i64, path: &str, index: usize) -> WorkerFile {
    let source = MemoryFile::new(name, bytes.to_vec(), mtime)
        .with_relative_path(path)
        .into_source();
    WorkerFile::new(id, source, index)
}

fn complete(response: WorkerResponse) -> BatchResult {
    match response {
        WorkerResponse::ProcessingComplete { result, .. } => result,
        other => panic!("expected PROCESSING_COMPLETE, got {other:?}"),
    }
}

fn ids(files: &[queuedupe::scanner::worker::FileResult]) -> Vec<&str> {
    files.iter().map(|f| f.id.as_str()).collect()
}

#[test]
fn test_worker_classifies_batch() {
    let w = worker();
    let files = vec![
        file("late", "memo.pdf", b"body", 200, "in/memo.pdf", 0),
        file("early", "memo copy.pdf", b"body", 100, "in/memo copy.pdf", 1),
        file("other", "x.pdf", b"different length", 5, "in/x.pdf", 2),
    ];

    let result = complete(w.process_files(files, "b1", |_| {}).unwrap());

    assert_eq!(ids(&result.ready_files), vec!["other", "early"]);
    assert_eq!(ids(&result.copy_files), vec!["late"]);
    assert!(result.read_error_files.is_empty());
    // Unique sizes are reported without a digest.
    assert!(result.ready_files[0].hash.is_none());
    assert!(result.ready_files[1].hash.is_some());
    w.shutdown();
}

#[test]
fn test_worker_collapses_same_file_picked_twice() {
    let w = worker();
    let source = MemoryFile::new("a.pdf", b"abc".to_vec(), 1).into_source();
    let files = vec![
        WorkerFile::new("f1", source.clone(), 0),
        WorkerFile::new("f2", source, 1),
    ];

    let result = complete(w.process_files(files, "b1", |_| {}).unwrap());

    assert_eq!(ids(&result.ready_files), vec!["f1"]);
    assert!(result.copy_files.is_empty());
}

#[test]
fn test_worker_reports_read_errors() {
    let w = worker();
    let locked = MemoryFile::new("locked.pdf", b"1234".to_vec(), 1)
        .failing()
        .into_source();
    let files = vec![
        WorkerFile::new("locked", locked, 0),
        file("fine", "fine.pdf", b"5678", 2, "", 1),
    ];

    let result = complete(w.process_files(files, "b1", |_| {}).unwrap());

    assert_eq!(ids(&result.read_error_files), vec!["locked"]);
    assert_eq!(result.read_error_files[0].status, "read error");
    assert!(result.read_error_files[0].error.is_some());
    assert_eq!(ids(&result.ready_files), vec!["fine"]);
}

#[test]
fn test_worker_rejects_duplicate_ids() {
    let w = worker();
    let files = vec![
        file("same", "a.pdf", b"a", 1, "", 0),
        file("same", "b.pdf", b"bb", 1, "", 1),
    ];

    match w.process_files(files, "b9", |_| {}).unwrap() {
        WorkerResponse::Error { batch_id, error } => {
            assert_eq!(batch_id, "b9");
            assert!(error.message.contains("same"));
        }
        other => panic!("expected ERROR, got {other:?}"),
    }
    // The worker survives a failed batch.
    assert!(w.health_check("h1", Duration::from_secs(5)).is_ok());
}

#[test]
fn test_worker_progress_reaches_total() {
    let w = worker();
    let files: Vec<WorkerFile> = (0..20)
        .map(|i| file(&format!("f{i}"), &format!("{i}.pdf"), &vec![1u8; 1 + i % 4], i as i64, "", i))
        .collect();

    let mut last = None;
    let result = complete(w.process_files(files, "b1", |p| last = Some(*p)).unwrap());

    let last = last.expect("progress updates with a zero throttle");
    assert_eq!(last.current, 20);
    assert_eq!(last.total, 20);
    assert_eq!(last.percentage, 100);
    assert_eq!(result.ready_files.len() + result.copy_files.len(), 20);
}

#[test]
fn test_health_check_echoes_request() {
    let w = worker();
    w.send(WorkerRequest::HealthCheck {
        batch_id: "probe".to_string(),
        timestamp: 1234,
    })
    .unwrap();

    match w.recv().unwrap() {
        WorkerResponse::HealthCheckResponse {
            batch_id,
            timestamp,
            status,
            response_time,
        } => {
            assert_eq!(batch_id, "probe");
            assert_eq!(timestamp, 1234);
            assert_eq!(status, "healthy");
            assert!(response_time > 0);
        }
        other => panic!("expected HEALTH_CHECK_RESPONSE, got {other:?}"),
    }
}

#[test]
fn test_response_wire_shape() {
    let w = worker();
    let files = vec![
        file("f1", "a.pdf", b"abc", 1, "docs/a.pdf", 0),
        file("f2", "b.pdf", b"abc", 2, "docs/b.pdf", 1),
    ];
    let response = w.process_files(files, "batch-7", |_| {}).unwrap();

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["type"], "PROCESSING_COMPLETE");
    assert_eq!(json["batchId"], "batch-7");
    let ready = &json["result"]["readyFiles"][0];
    assert_eq!(ready["id"], "f1");
    assert_eq!(ready["originalIndex"], 0);
    assert_eq!(ready["path"], "docs/a.pdf");
    assert_eq!(ready["metadata"]["sourceFileName"], "a.pdf");
    assert_eq!(ready["metadata"]["sourceFileSize"], 3);
    assert_eq!(ready["status"], "ready");
    assert!(ready.get("error").is_none());
    assert_eq!(json["result"]["copyFiles"][0]["status"], "copy");
}

#[test]
fn test_shortcut_skip_reason() {
    let w = worker();
    let files = vec![file("s", "matter.lnk", b"link", 1, "", 0)];
    let result = complete(w.process_files(files, "b1", |_| {}).unwrap());
    assert_eq!(result.ready_files[0].skip_reason.as_deref(), Some("shortcut"));
}
