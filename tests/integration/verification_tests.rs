use queuedupe::duplicates::IngestMode;
use queuedupe::queue::{QueueConfig, QueueEvent, RowStatus, UploadQueue};
use queuedupe::scanner::MemoryFile;
use queuedupe::verify::{spawn_auto_verifier, VerificationOutcome, Verifier};
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn prefilter_queue() -> UploadQueue {
    UploadQueue::new(
        QueueConfig::default()
            .with_tenant_id("firm-1")
            .with_ingest_mode(IngestMode::Prefilter),
    )
}

fn verifier() -> Verifier {
    Verifier::new().with_removal_animation(Duration::ZERO)
}

#[test]
fn test_prefilter_reads_nothing() {
    let a = MemoryFile::new("a.pdf", b"aaaa".to_vec(), 1);
    let b = MemoryFile::new("b.pdf", b"aaaa".to_vec(), 2);
    let mut q = prefilter_queue();
    q.add_files_to_queue(vec![a.clone().into_source(), b.clone().into_source()])
        .unwrap();

    assert_eq!(a.open_count() + b.open_count(), 0);
    let tentative: Vec<_> = q.rows().iter().filter(|r| r.is_tentative()).collect();
    assert_eq!(tentative.len(), 1);
    assert_eq!(tentative[0].status, RowStatus::Copy);
}

#[test]
fn test_confirmed_duplicate_is_removed() {
    let mut q = prefilter_queue();
    q.add_files_to_queue(vec![
        MemoryFile::new("a.pdf", b"same".to_vec(), 7).into_source(),
        MemoryFile::new("a.pdf", b"same".to_vec(), 7).into_source(),
    ])
    .unwrap();
    assert_eq!(q.progress().files_duplicates, 1);

    let outcome = verifier().run(&mut q);

    let VerificationOutcome::Completed(summary) = outcome else {
        panic!("expected a completed pass, got {outcome:?}");
    };
    assert_eq!(summary.confirmed_duplicates, 1);
    assert_eq!(summary.removed_batched, 1);
    assert_eq!(q.len(), 1);
    assert_eq!(q.rows()[0].status, RowStatus::Ready);
    assert!(q.rows()[0].content_hash.is_some());
    assert_eq!(q.progress().files_duplicates, 0);
}

#[test]
fn test_confirmed_copy_is_kept() {
    let mut q = prefilter_queue();
    q.add_files_to_queue(vec![
        MemoryFile::new("a.pdf", b"same".to_vec(), 1).into_source(),
        MemoryFile::new("b.pdf", b"same".to_vec(), 2).into_source(),
    ])
    .unwrap();

    let outcome = verifier().run(&mut q);

    assert!(matches!(outcome, VerificationOutcome::Completed(ref s) if s.confirmed_copies == 1));
    assert_eq!(q.len(), 2);
    assert_eq!(q.progress().files_copies, 1);
    assert!(q.rows().iter().all(|r| r.content_hash.is_some()));
    assert!(!q.rows().iter().any(|r| r.is_tentative()));
}

#[test]
fn test_mismatch_is_promoted() {
    let mut q = prefilter_queue();
    q.add_files_to_queue(vec![
        MemoryFile::new("a.pdf", b"1111".to_vec(), 1).into_source(),
        MemoryFile::new("b.pdf", b"2222".to_vec(), 2).into_source(),
        MemoryFile::new("c.pdf", b"3333".to_vec(), 3).into_source(),
    ])
    .unwrap();
    assert_eq!(q.progress().files_copies, 2);

    let outcome = verifier().run(&mut q);

    assert!(matches!(outcome, VerificationOutcome::Completed(ref s) if s.promoted == 2));
    assert_eq!(q.progress().files_ready, 3);
    assert!(q.rows().iter().all(|r| r.can_upload && r.reference_file_id.is_none()));
}

#[test]
fn test_unresolvable_reference_promotes_instead_of_removing() {
    let mut q = prefilter_queue();
    q.add_files_to_queue(vec![
        MemoryFile::new("a.pdf", b"same".to_vec(), 7).into_source(),
        MemoryFile::new("a.pdf", b"same".to_vec(), 7).into_source(),
    ])
    .unwrap();
    let dup = q.rows().iter().find(|r| r.is_duplicate()).unwrap();
    let (dup_id, reference) = (dup.id, dup.reference_file_id.unwrap());
    assert!(q.remove_from_queue(reference));

    verifier().run(&mut q);

    let row = q.row(dup_id).expect("tentative row must survive");
    assert_eq!(row.status, RowStatus::Ready);
    assert!(row.can_upload);
}

#[test]
fn test_layered_queue_has_nothing_to_verify() {
    let mut q = UploadQueue::new(QueueConfig::default().with_tenant_id("firm-1"));
    q.add_files_to_queue(vec![
        MemoryFile::new("a.pdf", b"same".to_vec(), 7).into_source(),
        MemoryFile::new("a.pdf", b"same".to_vec(), 7).into_source(),
    ])
    .unwrap();

    assert_eq!(verifier().run(&mut q), VerificationOutcome::NothingToVerify);
    // Metadata duplicates are trusted and stay.
    assert_eq!(q.progress().files_duplicates, 1);
}

#[test]
fn test_verification_events() {
    let mut q = prefilter_queue();
    q.add_files_to_queue(vec![
        MemoryFile::new("a.pdf", b"1111".to_vec(), 1).into_source(),
        MemoryFile::new("b.pdf", b"2222".to_vec(), 2).into_source(),
    ])
    .unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&events);
    q.subscribe(Box::new(move |event, _| log.lock().unwrap().push(event.clone())));

    verifier().run(&mut q);

    let events = events.lock().unwrap();
    assert!(events.contains(&QueueEvent::VerificationProgress { processed: 2, total: 2 }));
    assert_eq!(events.last(), Some(&QueueEvent::VerificationComplete));
}

#[test]
fn test_totals_accumulate_across_runs() {
    let v = verifier();
    for round in 0..2 {
        let mut q = prefilter_queue();
        q.add_files_to_queue(vec![
            MemoryFile::new("a.pdf", b"1111".to_vec(), round).into_source(),
            MemoryFile::new("b.pdf", b"2222".to_vec(), round).into_source(),
        ])
        .unwrap();
        v.run(&mut q);
    }
    let totals = v.totals().unwrap();
    assert_eq!(totals.passes, 2);
    assert_eq!(totals.promoted, 2);
    assert!(!v.is_running());
}

#[test]
fn test_background_verifier_runs_after_drop() {
    let q = prefilter_queue();
    let context = q.context();
    let queue = Arc::new(Mutex::new(q));
    let v = Arc::new(verifier());
    let stop = Arc::new(AtomicBool::new(false));

    let handle = spawn_auto_verifier(
        Arc::clone(&queue),
        Arc::clone(&v),
        context,
        Duration::from_millis(5),
        Duration::from_millis(20),
        Arc::clone(&stop),
    )
    .unwrap();

    queue
        .lock()
        .unwrap()
        .add_files_to_queue(vec![
            MemoryFile::new("a.pdf", b"same".to_vec(), 7).into_source(),
            MemoryFile::new("a.pdf", b"same".to_vec(), 7).into_source(),
        ])
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while v.totals().is_none() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    stop.store(true, Ordering::SeqCst);
    handle.join().unwrap();

    assert_eq!(v.totals().map(|t| t.confirmed_duplicates), Some(1));
    assert_eq!(queue.lock().unwrap().len(), 1);
}
