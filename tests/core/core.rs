use simstore::core::config::StoreConfig;
use simstore::core::document::ContainerType;
use simstore::core::journal::JOURNAL_FILE_NAME;
use simstore::core::lock::{self, LOCK_FILE_NAME};
use simstore::{Container, Group, Sim, StoreError};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_create_writes_one_state_file() {
    let tmp = tempdir().unwrap();
    let c = Container::create_or_load(tmp.path(), "testcontainer").unwrap();

    assert_eq!(c.name().unwrap(), "testcontainer");
    assert_eq!(c.containertype(), ContainerType::Container);
    assert_eq!(c.basedir(), tmp.path().join("testcontainer"));
    assert_eq!(c.location(), tmp.path());

    let state_files: Vec<String> = fs::read_dir(c.basedir())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| n.ends_with(".json"))
        .collect();
    assert_eq!(state_files, vec![format!("Container.{}.json", c.uuid())]);

    // No lease is held once the call returns.
    assert!(!c.basedir().join(LOCK_FILE_NAME).exists());
}

#[test]
fn test_regeneration_returns_same_record() {
    let tmp = tempdir().unwrap();
    let s1 = Sim::create_or_load(tmp.path(), "regen").unwrap();
    s1.tags().add(["fast"]).unwrap();

    let s2 = Sim::create_or_load(tmp.path(), "regen").unwrap();
    assert_eq!(s1, s2);
    assert_eq!(s1.uuid(), s2.uuid());
    assert!(s2.tags().contains("fast").unwrap());

    let opened = Sim::open(tmp.path().join("regen")).unwrap();
    assert_eq!(opened, s1);
}

#[test]
fn test_regeneration_with_other_type_is_rejected() {
    let tmp = tempdir().unwrap();
    Sim::create_or_load(tmp.path(), "taken").unwrap();

    let err = Group::create_or_load(tmp.path(), "taken").unwrap_err();
    assert!(matches!(err, StoreError::ValidationError(_)));
    let err = Group::open(tmp.path().join("taken")).unwrap_err();
    assert!(matches!(err, StoreError::ValidationError(_)));

    // A plain container view of any record is allowed.
    let any = Container::open(tmp.path().join("taken")).unwrap();
    assert_eq!(any.containertype(), ContainerType::Sim);
}

#[test]
fn test_open_empty_dir_reports_missing() {
    let tmp = tempdir().unwrap();
    fs::create_dir(tmp.path().join("empty")).unwrap();
    let err = Container::open(tmp.path().join("empty")).unwrap_err();
    assert!(matches!(err, StoreError::MissingMember(_)));
}

#[test]
fn test_invalid_names_are_rejected() {
    let tmp = tempdir().unwrap();
    for bad in ["", ".hidden", "a/b", ".."] {
        let err = Container::create_or_load(tmp.path(), bad).unwrap_err();
        assert!(matches!(err, StoreError::ValidationError(_)), "{:?}", bad);
    }
}

#[test]
fn test_equality_and_ordering() {
    let tmp = tempdir().unwrap();
    let a = Sim::create_or_load(tmp.path(), "alpha").unwrap();
    let b = Sim::create_or_load(tmp.path(), "bravo").unwrap();
    let c = Sim::create_or_load(tmp.path(), "charlie").unwrap();

    assert_ne!(a, b);
    assert!(a < b);
    assert!(c > b);

    let mut sims = vec![c.clone(), a.clone(), b.clone()];
    sims.sort();
    assert_eq!(sims, vec![a.clone(), b.clone(), c.clone()]);

    // Same name in different places: ties break on uuid.
    let other = tempdir().unwrap();
    let a2 = Sim::create_or_load(other.path(), "alpha").unwrap();
    assert_ne!(a, a2);
    assert_eq!(a.cmp(&a2), a.uuid().cmp(a2.uuid()));
}

#[test]
fn test_rename_moves_directory_and_name() {
    let tmp = tempdir().unwrap();
    let mut c = Container::create_or_load(tmp.path(), "before").unwrap();
    let uuid = c.uuid().to_string();
    c.tags().add(["kept"]).unwrap();

    c.rename("after").unwrap();
    assert_eq!(c.name().unwrap(), "after");
    assert_eq!(c.uuid(), uuid);
    assert_eq!(c.basedir(), tmp.path().join("after"));
    assert!(!tmp.path().join("before").exists());
    assert!(c.tags().contains("kept").unwrap());
    assert!(!c.basedir().join(LOCK_FILE_NAME).exists());

    // Renaming onto an existing directory fails and changes nothing.
    Container::create_or_load(tmp.path(), "occupied").unwrap();
    let err = c.rename("occupied").unwrap_err();
    assert!(matches!(err, StoreError::ValidationError(_)));
    assert_eq!(c.name().unwrap(), "after");
}

#[test]
fn test_relocate_keeps_identity() {
    let tmp = tempdir().unwrap();
    let mut g = Group::create_or_load(tmp.path(), "mobile").unwrap();
    let uuid = g.uuid().to_string();

    g.relocate(tmp.path().join("elsewhere/deeper")).unwrap();
    assert_eq!(g.uuid(), uuid);
    assert_eq!(g.name().unwrap(), "mobile");
    assert_eq!(g.location(), tmp.path().join("elsewhere/deeper"));

    let reopened = Group::open(tmp.path().join("elsewhere/deeper/mobile")).unwrap();
    assert_eq!(reopened, g);
}

#[test]
fn test_corrupt_state_is_surfaced() {
    let tmp = tempdir().unwrap();
    let c = Container::create_or_load(tmp.path(), "broken").unwrap();
    let state_path = c.basedir().join(format!("Container.{}.json", c.uuid()));
    fs::write(&state_path, b"{ truncated").unwrap();

    assert!(matches!(c.name(), Err(StoreError::CorruptState { .. })));
    assert!(matches!(
        c.tags().add(["x"]),
        Err(StoreError::CorruptState { .. })
    ));
    assert!(matches!(
        Container::create_or_load(tmp.path(), "broken"),
        Err(StoreError::CorruptState { .. })
    ));
    // Left for inspection rather than overwritten.
    assert_eq!(fs::read(&state_path).unwrap(), b"{ truncated");
}

#[test]
fn test_two_state_files_are_corrupt() {
    let tmp = tempdir().unwrap();
    let c = Container::create_or_load(tmp.path(), "twice").unwrap();
    let state_path = c.basedir().join(format!("Container.{}.json", c.uuid()));
    let other = c
        .basedir()
        .join("Container.01ARZ3NDEKTSV4RRFFQ69G5FAV.json");
    fs::copy(&state_path, &other).unwrap();

    let err = Container::open(c.basedir()).unwrap_err();
    assert!(matches!(err, StoreError::CorruptState { .. }));
}

#[test]
fn test_journal_records_mutations() {
    let tmp = tempdir().unwrap();
    let c = Container::create_or_load(tmp.path(), "audited").unwrap();
    c.tags().add(["one"]).unwrap();
    c.categories().set("k", "v").unwrap();
    let _ = c.tags().add([""]);

    assert_eq!(c.journal().path(), c.basedir().join(JOURNAL_FILE_NAME));
    let events = c.journal().events().unwrap();
    let ops: Vec<&str> = events.iter().map(|e| e.op.as_str()).collect();
    assert_eq!(ops, vec!["identity.create", "tags.add", "categories.add"]);
    assert!(events.iter().all(|e| e.record == c.uuid()));
    assert!(events.iter().all(|e| e.status == "success"));
    assert!(events[0].actor.starts_with("pid:"));
}

#[test]
fn test_journal_can_be_disabled() {
    let tmp = tempdir().unwrap();
    let config = StoreConfig {
        journal: false,
        ..StoreConfig::default()
    };
    let c = Container::create_or_load_with_config(tmp.path(), "quiet", &config).unwrap();
    c.tags().add(["x"]).unwrap();
    assert!(!c.basedir().join(JOURNAL_FILE_NAME).exists());
}

#[test]
fn test_unwritable_journal_does_not_fail_committed_writes() {
    let tmp = tempdir().unwrap();
    let c = Container::create_or_load(tmp.path(), "blocked").unwrap();
    let journal = c.basedir().join(JOURNAL_FILE_NAME);
    fs::remove_file(&journal).unwrap();
    fs::create_dir(&journal).unwrap();

    c.tags().add(["x"]).unwrap();
    assert!(c.tags().contains("x").unwrap());
    c.data().add("value", 1).unwrap();
    assert!(c.data().contains("value").unwrap());
    c.data().remove("value").unwrap();
    assert!(!c.data().contains("value").unwrap());

    // Rejected calls still report their own error.
    let err = c.tags().add([""]).unwrap_err();
    assert!(matches!(err, StoreError::ValidationError(_)));
    let mut c = c;
    let err = c.rename("bad/name").unwrap_err();
    assert!(matches!(err, StoreError::ValidationError(_)));
    c.rename("moved").unwrap();
    assert_eq!(c.name().unwrap(), "moved");
}

#[test]
fn test_config_from_directory() {
    let tmp = tempdir().unwrap();
    assert_eq!(StoreConfig::load(tmp.path()).unwrap(), StoreConfig::default());

    fs::write(
        tmp.path().join("simstore.toml"),
        "lock_timeout_ms = 250\nread_retries = 0\n",
    )
    .unwrap();
    let config = StoreConfig::load(tmp.path()).unwrap();
    assert_eq!(config.lock_timeout_ms, 250);
    assert_eq!(config.read_retries, 0);
    assert!(config.journal);

    fs::write(tmp.path().join("simstore.toml"), "lock_timeout_ms = \"soon\"\n").unwrap();
    assert!(matches!(
        StoreConfig::load(tmp.path()),
        Err(StoreError::ConfigError(_))
    ));
}

#[test]
fn test_held_lock_times_out() {
    let tmp = tempdir().unwrap();
    let config = StoreConfig {
        lock_timeout_ms: 50,
        lock_retry_ms: 5,
        ..StoreConfig::default()
    };
    let c = Container::create_or_load_with_config(tmp.path(), "busy", &config).unwrap();
    let lease = lock::acquire(&lock::lock_path(c.basedir()), &config).unwrap();

    let err = c.tags().add(["blocked"]).unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(err, StoreError::LockTimeout { .. }));

    drop(lease);
    c.tags().add(["blocked"]).unwrap();
}
