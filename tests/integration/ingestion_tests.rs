use queuedupe::queue::{
    sort_queue, QueueConfig, QueueError, QueueEvent, RowStatus, UploadQueue, MISSING_TENANT_MESSAGE,
};
use queuedupe::scanner::{MemoryFile, SourceRef};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

fn queue() -> UploadQueue {
    UploadQueue::new(QueueConfig::default().with_tenant_id("firm-1"))
}

fn sources(files: &[MemoryFile]) -> Vec<SourceRef> {
    files.iter().map(|f| f.clone().into_source()).collect()
}

/// Files of distinct sizes, so nothing collides.
fn unique_files(count: usize) -> Vec<SourceRef> {
    (0..count)
        .map(|i| {
            MemoryFile::new(format!("file_{i:04}.pdf"), vec![b'x'; i + 1], i as i64).into_source()
        })
        .collect()
}

#[test]
fn test_unique_sizes_are_ready_without_digests() {
    let files = vec![
        MemoryFile::new("a.pdf", b"1".to_vec(), 1),
        MemoryFile::new("b.pdf", b"22".to_vec(), 1),
        MemoryFile::new("c.pdf", b"333".to_vec(), 1),
    ];
    let mut q = queue();
    q.add_files_to_queue(sources(&files)).unwrap();

    assert_eq!(q.progress().files_ready, 3);
    for row in q.rows() {
        assert_eq!(row.status, RowStatus::Ready);
        assert!(row.can_upload);
        assert!(row.metadata_hash.is_none());
        assert!(row.content_hash.is_none());
    }
    assert!(files.iter().all(|f| f.open_count() == 0));
}

#[test]
fn test_lone_large_file_is_never_read() {
    let big = MemoryFile::new("scan.pdf", vec![7u8; 10 * 1024 * 1024], 42);
    let small = MemoryFile::new("note.pdf", b"note".to_vec(), 42);
    let mut q = queue();
    q.add_files_to_queue(sources(&[big.clone(), small])).unwrap();

    assert_eq!(big.open_count(), 0);
    let row = q.rows().iter().find(|r| r.name == "scan.pdf").unwrap();
    assert_eq!(row.status, RowStatus::Ready);
    assert!(row.content_hash.is_none());
}

#[test]
fn test_same_metadata_is_duplicate_without_content_read() {
    let first = MemoryFile::new("brief.pdf", b"same bytes".to_vec(), 1000);
    let second = MemoryFile::new("brief.pdf", b"same bytes".to_vec(), 1000);
    let mut q = queue();
    q.add_files_to_queue(sources(&[first, second.clone()])).unwrap();

    assert_eq!(q.progress().files_ready, 1);
    assert_eq!(q.progress().files_duplicates, 1);
    assert_eq!(second.open_count(), 0);

    let dup = q.rows().iter().find(|r| r.is_duplicate()).unwrap();
    assert!(dup.content_hash.is_none());
    assert!(dup.metadata_hash.is_some());
    assert!(!dup.can_upload);
}

#[test]
fn test_same_bytes_different_name_is_copy() {
    let mut q = queue();
    q.add_files_to_queue(vec![
        MemoryFile::new("contract.pdf", b"signed".to_vec(), 1).into_source(),
        MemoryFile::new("contract (1).pdf", b"signed".to_vec(), 2).into_source(),
    ])
    .unwrap();

    assert_eq!(q.len(), 2);
    assert_eq!(q.progress().files_ready, 1);
    assert_eq!(q.progress().files_copies, 1);
    assert_eq!(q.progress().files_duplicates, 0);

    let primary = q.rows().iter().find(|r| r.status == RowStatus::Ready).unwrap();
    let copy = q.rows().iter().find(|r| r.is_copy()).unwrap();
    assert_eq!(copy.reference_file_id, Some(primary.id));
    assert_eq!(copy.content_hash, primary.content_hash);
}

#[test]
fn test_same_size_different_bytes_both_ready() {
    let mut q = queue();
    q.add_files_to_queue(vec![
        MemoryFile::new("a.pdf", b"aaaa".to_vec(), 1).into_source(),
        MemoryFile::new("b.pdf", b"bbbb".to_vec(), 1).into_source(),
    ])
    .unwrap();

    assert_eq!(q.progress().files_ready, 2);
    assert!(q.rows().iter().all(|r| r.content_hash.is_some()));
}

#[test]
fn test_mixed_drop_family() {
    let bytes = vec![3u8; 2048];
    let mut q = queue();
    q.add_files_to_queue(vec![
        MemoryFile::new("A.pdf", bytes.clone(), 100)
            .with_relative_path("x/A.pdf")
            .into_source(),
        MemoryFile::new("A.pdf", bytes.clone(), 100)
            .with_relative_path("y/A.pdf")
            .into_source(),
        MemoryFile::new("C.pdf", bytes, 200)
            .with_relative_path("x/C.pdf")
            .into_source(),
    ])
    .unwrap();

    let summary: Vec<(&str, &str, RowStatus)> = q
        .rows()
        .iter()
        .map(|r| (r.folder_path.as_str(), r.name.as_str(), r.status))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("/x", "A.pdf", RowStatus::Ready),
            ("/x", "C.pdf", RowStatus::Copy),
            ("/y", "A.pdf", RowStatus::Duplicate),
        ]
    );
}

#[test]
fn test_redrop_is_duplicate_of_existing_row() {
    let mut q = queue();
    q.add_files_to_queue(vec![MemoryFile::new("memo.pdf", b"memo".to_vec(), 5).into_source()])
        .unwrap();
    let original = q.rows()[0].id;

    let again = MemoryFile::new("memo.pdf", b"memo".to_vec(), 5);
    q.add_files_to_queue(sources(&[again.clone()])).unwrap();

    assert_eq!(q.len(), 2);
    assert_eq!(again.open_count(), 0);
    let dup = q.rows().iter().find(|r| r.is_duplicate()).unwrap();
    assert_eq!(dup.reference_file_id, Some(original));
    // The touched family moves to the top together.
    assert_eq!(q.rows()[0].group_timestamp, q.rows()[1].group_timestamp);
}

#[test]
fn test_newest_drop_sorts_first() {
    let mut q = queue();
    q.add_files_to_queue(vec![MemoryFile::new("old.pdf", b"o".to_vec(), 1).into_source()])
        .unwrap();
    q.add_files_to_queue(vec![MemoryFile::new("new.pdf", b"nn".to_vec(), 1).into_source()])
        .unwrap();

    assert_eq!(q.rows()[0].name, "new.pdf");
    assert_eq!(q.rows()[1].name, "old.pdf");
    assert!(q.rows()[0].batch_order > q.rows()[1].batch_order);
}

#[test]
fn test_initial_batch_painted_before_bulk() {
    let mut q = queue();
    let painted = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&painted);
    q.subscribe(Box::new(move |event, rows| {
        if let QueueEvent::InitialBatchReady { count } = event {
            seen.lock().unwrap().push((*count, rows.len()));
        }
    }));

    q.add_files_to_queue(unique_files(500)).unwrap();

    assert_eq!(*painted.lock().unwrap(), vec![(200, 200)]);
    assert_eq!(q.len(), 500);
    assert_eq!(q.progress().processed, 500);
    assert_eq!(q.progress().total, 500);
    assert!(!q.progress().is_queueing);
}

#[test]
fn test_batch_events_track_progress() {
    let mut q = UploadQueue::new(
        QueueConfig::default()
            .with_tenant_id("firm-1")
            .with_phase1_size(10)
            .with_batch_size(20),
    );
    let events = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&events);
    q.subscribe(Box::new(move |event, _| log.lock().unwrap().push(event.clone())));

    q.add_files_to_queue(unique_files(55)).unwrap();

    let events = events.lock().unwrap();
    assert_eq!(
        *events,
        vec![
            QueueEvent::InitialBatchReady { count: 10 },
            QueueEvent::BatchApplied { processed: 30, total: 55 },
            QueueEvent::BatchApplied { processed: 50, total: 55 },
            QueueEvent::BatchApplied { processed: 55, total: 55 },
            QueueEvent::AdditionComplete { cancelled: false },
        ]
    );
}

#[test]
fn test_cancel_mid_bulk_keeps_applied_rows() {
    let mut q = queue();
    let flag = q.cancel_flag();
    let completions = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&completions);
    q.subscribe(Box::new(move |event, _| match event {
        QueueEvent::BatchApplied { .. } => flag.store(true, Ordering::SeqCst),
        QueueEvent::AdditionComplete { cancelled } => seen.lock().unwrap().push(*cancelled),
        _ => {}
    }));

    let result = q.add_files_to_queue(unique_files(2500));

    assert!(result.is_ok());
    assert_eq!(q.len(), 1200);
    assert!(q.progress().cancelled);
    assert_eq!(q.progress().processed, 1200);
    assert_eq!(q.progress().files_ready, 1200);
    assert_eq!(*completions.lock().unwrap(), vec![true]);
    // The flag is consumed so the next drop runs normally.
    assert!(!q.cancel_flag().load(Ordering::SeqCst));
}

#[test]
fn test_stale_cancel_is_ignored_by_next_drop() {
    let mut q = queue();
    q.cancel_queue();
    q.add_files_to_queue(unique_files(10)).unwrap();
    // Phase 1 covers every file, so the cancel is stale.
    assert!(!q.progress().cancelled);
    assert_eq!(q.len(), 10);

    q.add_files_to_queue(unique_files(3)).unwrap();
    assert_eq!(q.len(), 13);
    assert!(!q.progress().cancelled);
}

#[test]
fn test_idle_cancel_is_ignored_by_large_drop() {
    let mut q = queue();
    q.cancel_queue();
    q.add_files_to_queue(unique_files(500)).unwrap();

    assert_eq!(q.len(), 500);
    assert_eq!(q.progress().processed, 500);
    assert!(!q.progress().cancelled);
    assert!(!q.cancel_flag().load(Ordering::SeqCst));
}

#[test]
fn test_resort_is_stable() {
    let mut q = queue();
    let mut files = unique_files(30);
    files.extend((0..10).map(|i| {
        MemoryFile::new(format!("copy_{i}.pdf"), vec![b'x'; i + 1], 99).into_source()
    }));
    q.add_files_to_queue(files).unwrap();

    let before: Vec<_> = q.rows().iter().map(|r| r.id).collect();
    let mut rows = q.rows().to_vec();
    sort_queue(&mut rows);
    sort_queue(&mut rows);
    let after: Vec<_> = rows.iter().map(|r| r.id).collect();
    assert_eq!(before, after);
}

#[test]
fn test_missing_tenant_marks_rows_read_error() {
    let mut q = UploadQueue::new(QueueConfig::default());
    let file = MemoryFile::new("a.pdf", b"a".to_vec(), 1);
    let result = q.add_files_to_queue(sources(&[file.clone()]));

    assert_eq!(result, Err(QueueError::MissingTenant));
    assert_eq!(q.progress().files_read_error, 1);
    assert_eq!(q.rows()[0].error_message.as_deref(), Some(MISSING_TENANT_MESSAGE));
    assert!(!q.progress().is_queueing);
    assert_eq!(file.open_count(), 0);
}

#[test]
fn test_blank_tenant_is_missing() {
    let mut q = UploadQueue::new(QueueConfig::default().with_tenant_id("   "));
    let result = q.add_files_to_queue(unique_files(2));
    assert_eq!(result, Err(QueueError::MissingTenant));
}

#[test]
fn test_tenant_scopes_metadata() {
    let bytes = b"engagement".to_vec();
    let mut firm_a = UploadQueue::new(QueueConfig::default().with_tenant_id("firm-a"));
    let mut firm_b = UploadQueue::new(QueueConfig::default().with_tenant_id("firm-b"));
    for q in [&mut firm_a, &mut firm_b] {
        q.add_files_to_queue(vec![
            MemoryFile::new("letter.pdf", bytes.clone(), 1).into_source(),
            MemoryFile::new("other.pdf", bytes.clone(), 2).into_source(),
        ])
        .unwrap();
    }
    let digest = |q: &UploadQueue| {
        q.rows()
            .iter()
            .find(|r| r.name == "letter.pdf")
            .and_then(|r| r.metadata_hash.clone())
    };
    assert_ne!(digest(&firm_a), digest(&firm_b));
}

#[test]
fn test_unsupported_types_are_not_hashed() {
    let shortcut = MemoryFile::new("link.lnk", b"same".to_vec(), 1);
    let mut q = queue();
    q.add_files_to_queue(vec![
        shortcut.clone().into_source(),
        MemoryFile::new("doc.pdf", b"same".to_vec(), 1).into_source(),
    ])
    .unwrap();

    assert_eq!(q.progress().files_unsupported, 1);
    assert_eq!(q.progress().files_ready, 1);
    assert_eq!(shortcut.open_count(), 0);
    let row = q.rows().iter().find(|r| r.name == "link.lnk").unwrap();
    assert_eq!(row.status, RowStatus::NotApplicable);
    assert!(!row.can_upload);
}

#[test]
fn test_unreadable_file_only_affects_its_row() {
    let mut q = queue();
    q.add_files_to_queue(vec![
        MemoryFile::new("locked.pdf", b"1234".to_vec(), 1).failing().into_source(),
        MemoryFile::new("fine.pdf", b"5678".to_vec(), 2).into_source(),
    ])
    .unwrap();

    assert_eq!(q.progress().files_read_error, 1);
    assert_eq!(q.progress().files_ready, 1);
    let locked = q.rows().iter().find(|r| r.name == "locked.pdf").unwrap();
    assert!(locked.error_message.is_some());
    assert!(!locked.can_upload);
}

#[test]
fn test_empty_drop() {
    let mut q = queue();
    q.add_files_to_queue(Vec::new()).unwrap();
    assert!(q.is_empty());
    assert!(q.context().is_addition_complete());
}
