use std::sync::Arc;
use std::time::Duration;

use folio_core::store::{
    ChangeKind, ChangeNotifier, FileMedium, InboxView, LocalCatalog, MemoryMedium,
    MessageFilter, MessageStore, ProjectPatch, StorageMedium, StoreError, StoreOptions, BACKUP_SLOT,
    LEGACY_CONTACT_SLOT, MESSAGES_SLOT, PROJECTS_SLOT,
};
use folio_core::validation::{ContactSubmission, ValidationFailure};

fn submission(name: &str, email: &str) -> ContactSubmission {
    ContactSubmission::new(name, email, None, "hi")
}

fn open(primary: &MemoryMedium) -> MessageStore {
    MessageStore::open(Arc::new(primary.clone()), None, StoreOptions::default()).unwrap()
}

#[test]
fn test_inbox_scenario() {
    let medium = MemoryMedium::new("local");
    let store = open(&medium);

    let ann = store.submit(&submission("Ann", "a@x.com")).unwrap();
    let stats = store.stats().unwrap();
    assert_eq!((stats.total, stats.unread, stats.today), (1, 1, 1));

    store.submit(&submission("Bo", "b@y.org")).unwrap();
    let today: Vec<String> = store
        .list(MessageFilter::Today)
        .unwrap()
        .into_iter()
        .map(|m| m.name)
        .collect();
    assert_eq!(today, vec!["Bo", "Ann"]);

    let all = store.list(MessageFilter::All).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].name, "Bo");
    assert_eq!(all[1].subject, "No subject");
    assert!(all.iter().all(|m| !m.read));

    let key = ann.id.unwrap().to_string();
    assert!(store.mark_read(&key).unwrap());

    let unread = store.list(MessageFilter::Unread).unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].name, "Bo");

    let stats = store.stats().unwrap();
    assert_eq!((stats.total, stats.unread, stats.today), (2, 1, 2));

    assert!(!store.mark_read("missing").unwrap());
    assert!(store.delete(&key).unwrap());
    assert_eq!(store.list(MessageFilter::All).unwrap().len(), 1);
}

#[test]
fn test_blank_name_or_message_leaves_store_unchanged() {
    let medium = MemoryMedium::new("local");
    let store = open(&medium);

    for rejected in [
        ContactSubmission::new("   ", "a@x.com", None, "hi"),
        ContactSubmission::new("Ann", "a@x.com", None, ""),
    ] {
        let err = store.submit(&rejected).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationFailure::MissingFields)
        ));
    }

    assert!(store.messages().unwrap().is_empty());
    assert_eq!(store.version().unwrap(), 0);
}

#[test]
fn test_export_then_import_restores_inbox() {
    let source = open(&MemoryMedium::new("local"));
    source.submit(&submission("Ann", "a@x.com")).unwrap();
    let bo = source.submit(&submission("Bo", "b@y.org")).unwrap();
    source.submit(&submission("Cy", "c@z.net")).unwrap();
    source.mark_read(&bo.id.unwrap().to_string()).unwrap();

    let exported = source.export().unwrap();

    let target = open(&MemoryMedium::new("local"));
    let summary = target.import(&exported).unwrap();
    assert_eq!((summary.imported, summary.skipped), (3, 0));
    assert_eq!(target.messages().unwrap(), source.messages().unwrap());

    let again = target.import(&exported).unwrap();
    assert_eq!((again.imported, again.skipped), (0, 3));
    assert_eq!(target.messages().unwrap().len(), 3);
}

#[test]
fn test_open_twice_is_idempotent() {
    let medium = MemoryMedium::new("local");
    let first = open(&medium);
    first.submit(&submission("Ann", "a@x.com")).unwrap();
    let version = first.version().unwrap();

    let second = open(&medium);
    assert_eq!(second.version().unwrap(), version);
    assert_eq!(second.messages().unwrap(), first.messages().unwrap());

    let third = open(&medium);
    assert_eq!(third.version().unwrap(), version);
}

#[test]
fn test_backup_never_overwrites_primary() {
    let medium = MemoryMedium::new("local");
    medium
        .write(MESSAGES_SLOT, r#"{"version":4,"messages":[]}"#)
        .unwrap();
    medium
        .write(
            BACKUP_SLOT,
            r#"[{"id":1,"name":"Old","email":"o@x.com","message":"stale","timestamp":"2023-01-01T00:00:00.000Z"}]"#,
        )
        .unwrap();

    let store = open(&medium);
    assert!(store.messages().unwrap().is_empty());
    assert_eq!(store.version().unwrap(), 4);
}

#[test]
fn test_backup_recovers_missing_primary() {
    let medium = MemoryMedium::new("local");
    medium
        .write(
            BACKUP_SLOT,
            r#"[{"id":1,"name":"Old","email":"o@x.com","message":"kept","timestamp":"2023-01-01T00:00:00.000Z"}]"#,
        )
        .unwrap();

    let store = open(&medium);
    let messages = store.messages().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message, "kept");
    assert!(medium.contains(MESSAGES_SLOT));
}

#[test]
fn test_legacy_slot_migrates_once() {
    let medium = MemoryMedium::new("local");
    medium
        .write(
            LEGACY_CONTACT_SLOT,
            r#"[{"id":1700000000000,"name":"Cy","email":"c@z.net","message":"from the old page","created":"2023-11-14T22:13:20.000Z"}]"#,
        )
        .unwrap();

    let store = open(&medium);
    assert_eq!(store.messages().unwrap().len(), 1);
    assert!(!medium.contains(LEGACY_CONTACT_SLOT));
    let version = store.version().unwrap();

    let reopened = open(&medium);
    assert_eq!(reopened.messages().unwrap().len(), 1);
    assert_eq!(reopened.version().unwrap(), version);
}

#[test]
fn test_quota_failure_falls_back() {
    let primary = MemoryMedium::with_quota("primary", 0);
    let fallback = MemoryMedium::new("session");
    let store = MessageStore::open(
        Arc::new(primary.clone()),
        Some(Arc::new(fallback.clone())),
        StoreOptions::default(),
    )
    .unwrap();

    store.submit(&submission("Ann", "a@x.com")).unwrap();

    assert!(!primary.contains(MESSAGES_SLOT));
    assert!(fallback.contains(MESSAGES_SLOT));
    assert_eq!(store.list(MessageFilter::All).unwrap()[0].name, "Ann");
}

#[test]
fn test_storage_failure_leaves_list_unchanged() {
    let primary = MemoryMedium::with_quota("primary", 0);
    let store =
        MessageStore::open(Arc::new(primary), None, StoreOptions::default()).unwrap();

    assert!(store.submit(&submission("Ann", "a@x.com")).is_err());
    assert!(store.messages().unwrap().is_empty());
}

#[test]
fn test_list_never_exceeds_max_messages() {
    let store = MessageStore::open(
        Arc::new(MemoryMedium::new("local")),
        None,
        StoreOptions { max_messages: 3 },
    )
    .unwrap();

    for i in 0..5 {
        store
            .submit(&submission(&format!("Sender {}", i), "s@x.com"))
            .unwrap();
    }

    let messages = store.list(MessageFilter::All).unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].name, "Sender 4");
}

#[tokio::test]
async fn test_view_reloads_on_change() {
    let store = open(&MemoryMedium::new("local"));
    let mut view = InboxView::open(store.clone(), MessageFilter::Unread).unwrap();
    assert_eq!(view.stats().total, 0);

    let writer = store.clone();
    tokio::spawn(async move {
        writer.submit(&submission("Ann", "a@x.com")).unwrap();
    });

    let changed = tokio::time::timeout(Duration::from_secs(2), view.wait_for_change())
        .await
        .unwrap()
        .unwrap();
    assert!(changed);
    assert_eq!(view.messages().len(), 1);
    assert_eq!(view.stats().unread, 1);
}

#[test]
fn test_concurrent_writers_keep_every_update() {
    let store = MessageStore::open(
        Arc::new(MemoryMedium::new("local")),
        None,
        StoreOptions { max_messages: 1000 },
    )
    .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..10 {
                    store
                        .submit(&submission(&format!("T{}-{}", t, i), "t@x.com"))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.messages().unwrap().len(), 80);
    assert_eq!(store.version().unwrap(), 80);
}

#[test]
fn test_separately_opened_stores_keep_every_update() {
    let medium = MemoryMedium::new("local");

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = MessageStore::open(
                Arc::new(medium.clone()),
                None,
                StoreOptions { max_messages: 1000 },
            )
            .unwrap();
            std::thread::spawn(move || {
                for i in 0..50 {
                    store
                        .submit(&submission(&format!("T{}-{}", t, i), "t@x.com"))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let store = open(&medium);
    assert_eq!(store.messages().unwrap().len(), 400);
    assert_eq!(store.version().unwrap(), 400);
}

#[test]
fn test_stores_over_one_directory_keep_every_update() {
    let dir = tempfile::TempDir::new().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let path = dir.path().to_path_buf();
            std::thread::spawn(move || {
                let store = MessageStore::open(
                    Arc::new(FileMedium::open(&path).unwrap()),
                    None,
                    StoreOptions { max_messages: 1000 },
                )
                .unwrap();
                for i in 0..25 {
                    store
                        .submit(&submission(&format!("T{}-{}", t, i), "t@x.com"))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let store = MessageStore::open(
        Arc::new(FileMedium::open(dir.path()).unwrap()),
        None,
        StoreOptions { max_messages: 1000 },
    )
    .unwrap();
    assert_eq!(store.messages().unwrap().len(), 100);
    assert_eq!(store.version().unwrap(), 100);
}

#[test]
fn test_catalog_and_inbox_share_one_directory() {
    let dir = tempfile::TempDir::new().unwrap();
    let medium: Arc<dyn StorageMedium> = Arc::new(FileMedium::open(dir.path()).unwrap());
    let notifier = ChangeNotifier::new();
    let mut changes = notifier.subscribe();

    let store = MessageStore::open_with_notifier(
        medium.clone(),
        None,
        StoreOptions::default(),
        notifier.clone(),
    )
    .unwrap();
    let catalog = LocalCatalog::new(medium.clone(), notifier);

    store.submit(&submission("Ann", "a@x.com")).unwrap();
    let project = catalog
        .add_project(ProjectPatch {
            title: Some("Folio".to_string()),
            tech_stack: Some(vec!["Rust".to_string()]),
            ..Default::default()
        })
        .unwrap();

    let first = changes.try_recv().unwrap();
    assert_eq!(first.slot, MESSAGES_SLOT);
    let second = changes.try_recv().unwrap();
    assert_eq!(second.slot, PROJECTS_SLOT);
    assert_eq!(second.kind, ChangeKind::ProjectsChanged);

    let reopened = LocalCatalog::new(
        Arc::new(FileMedium::open(dir.path()).unwrap()),
        ChangeNotifier::new(),
    );
    assert_eq!(reopened.projects().unwrap(), vec![project]);
    assert_eq!(store.messages().unwrap().len(), 1);
}
