use queuedupe::queue::{QueueConfig, QueueEvent, RowId, RowStatus, UploadQueue};
use queuedupe::scanner::MemoryFile;
use std::sync::{Arc, Mutex};

/// ready, copy, and duplicate rows of one family plus an unrelated file.
fn family_queue() -> UploadQueue {
    let mut q = UploadQueue::new(QueueConfig::default().with_tenant_id("firm-1"));
    q.add_files_to_queue(vec![
        MemoryFile::new("deed.pdf", b"deed".to_vec(), 1)
            .with_relative_path("a/deed.pdf")
            .into_source(),
        MemoryFile::new("deed.pdf", b"deed".to_vec(), 1)
            .with_relative_path("b/deed.pdf")
            .into_source(),
        MemoryFile::new("deed-scan.pdf", b"deed".to_vec(), 2)
            .with_relative_path("a/deed-scan.pdf")
            .into_source(),
        MemoryFile::new("lonely.pdf", b"unique file".to_vec(), 3).into_source(),
    ])
    .unwrap();
    q
}

fn id_of(q: &UploadQueue, status: RowStatus) -> RowId {
    q.rows().iter().find(|r| r.status == status).unwrap().id
}

#[test]
fn test_family_shape() {
    let q = family_queue();
    assert_eq!(q.progress().files_ready, 2);
    assert_eq!(q.progress().files_copies, 1);
    assert_eq!(q.progress().files_duplicates, 1);
}

#[test]
fn test_remove_from_queue_notifies() {
    let mut q = family_queue();
    let removed = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&removed);
    q.subscribe(Box::new(move |event, _| {
        if let QueueEvent::RowsRemoved(ids) = event {
            seen.lock().unwrap().extend(ids.iter().copied());
        }
    }));

    let copy = id_of(&q, RowStatus::Copy);
    assert!(q.remove_from_queue(copy));
    assert!(!q.remove_from_queue(copy));

    assert_eq!(*removed.lock().unwrap(), vec![copy]);
    assert_eq!(q.len(), 3);
    assert_eq!(q.progress().files_copies, 0);
}

#[test]
fn test_clear_queue_keeps_uploadable_rows_and_copies() {
    let mut q = family_queue();
    let lonely = q.rows().iter().find(|r| r.name == "lonely.pdf").unwrap().id;
    q.skip_file(lonely);

    let removed = q.clear_queue();

    assert_eq!(removed, 2);
    assert_eq!(q.len(), 2);
    assert!(q
        .rows()
        .iter()
        .all(|r| matches!(r.status, RowStatus::Ready | RowStatus::Copy)));
}

#[test]
fn test_clear_duplicates() {
    let mut q = family_queue();
    assert_eq!(q.clear_duplicates(), 1);
    assert_eq!(q.progress().files_duplicates, 0);
    assert_eq!(q.clear_duplicates(), 0);
}

#[test]
fn test_clear_skipped_takes_copies_of_skipped_primary() {
    let mut q = family_queue();
    let primary = q
        .rows()
        .iter()
        .find(|r| r.status == RowStatus::Ready && r.name == "deed.pdf")
        .unwrap()
        .id;
    q.skip_file(primary);

    let removed = q.clear_skipped();

    assert_eq!(removed, 2);
    assert!(q.rows().iter().all(|r| r.name != "deed-scan.pdf"));
    assert!(q.row(primary).is_none());
}

#[test]
fn test_skip_and_undo() {
    let mut q = family_queue();
    let lonely = q.rows().iter().find(|r| r.name == "lonely.pdf").unwrap().id;

    assert!(q.skip_file(lonely));
    assert_eq!(q.row(lonely).unwrap().status, RowStatus::Skip);
    assert_eq!(q.progress().files_ready, 1);

    assert!(q.undo_skip(lonely));
    let row = q.row(lonely).unwrap();
    assert_eq!(row.status, RowStatus::Ready);
    assert!(row.can_upload);
    assert!(!q.undo_skip(lonely));
}

#[test]
fn test_select_and_deselect_all() {
    let mut q = family_queue();
    assert_eq!(q.deselect_all(), 2);
    assert_eq!(q.progress().files_ready, 0);
    assert_eq!(q.progress().files_copies, 1);

    assert_eq!(q.select_all(), 2);
    assert_eq!(q.progress().files_ready, 2);
}

#[test]
fn test_set_can_upload_only_on_skip_rows() {
    let mut q = family_queue();
    let lonely = q.rows().iter().find(|r| r.name == "lonely.pdf").unwrap().id;
    assert!(!q.set_can_upload(lonely, false));

    q.skip_file(lonely);
    assert!(q.set_can_upload(lonely, false));
    assert!(!q.row(lonely).unwrap().can_upload);
}

#[test]
fn test_update_file_status_unknown_row() {
    let mut q = family_queue();
    assert!(!q.update_file_status(RowId(9999), RowStatus::Ready));
}

#[test]
fn test_swap_to_primary() {
    let mut q = family_queue();
    let old = q
        .rows()
        .iter()
        .find(|r| r.status == RowStatus::Ready && r.name == "deed.pdf")
        .unwrap()
        .id;
    let copy = id_of(&q, RowStatus::Copy);
    let dup = id_of(&q, RowStatus::Duplicate);

    assert!(q.swap_to_primary(copy));

    let new_primary = q.row(copy).unwrap();
    assert_eq!(new_primary.status, RowStatus::Ready);
    assert!(new_primary.reference_file_id.is_none());
    let demoted = q.row(old).unwrap();
    assert_eq!(demoted.status, RowStatus::Copy);
    assert_eq!(demoted.reference_file_id, Some(copy));
    assert_eq!(q.row(dup).unwrap().reference_file_id, Some(copy));

    assert!(!q.swap_to_primary(copy));
}

#[test]
fn test_duplicates_visibility() {
    let mut q = family_queue();
    assert_eq!(q.visible_rows().len(), 4);

    assert!(q.toggle_duplicates_visibility());
    let visible = q.visible_rows();
    assert_eq!(visible.len(), 2);
    assert!(visible.iter().all(|r| r.status == RowStatus::Ready));

    assert!(!q.toggle_duplicates_visibility());
    assert_eq!(q.visible_rows().len(), 4);
}

#[test]
fn test_unsubscribe() {
    let mut q = family_queue();
    let count = Arc::new(Mutex::new(0));
    let seen = Arc::clone(&count);
    let id = q.subscribe(Box::new(move |_, _| *seen.lock().unwrap() += 1));

    q.deselect_all();
    assert!(q.unsubscribe(id));
    q.select_all();

    assert_eq!(*count.lock().unwrap(), 1);
    assert!(!q.unsubscribe(id));
}
