use simstore::core::schemas::MANIFEST_FILE_NAME;
use simstore::plugins::payload::{Column, ColumnData, Label, TableKind};
use simstore::{Container, Format, Generic, NdArray, Payload, Sim, StoreError, Table};
use std::fs;
use tempfile::tempdir;

fn container() -> (tempfile::TempDir, Container) {
    let tmp = tempdir().unwrap();
    let c = Container::create_or_load(tmp.path(), "testcontainer").unwrap();
    (tmp, c)
}

#[test]
fn test_frame_round_trip() {
    let (_tmp, c) = container();
    let values: Vec<f64> = (0..100 * 3).map(|i| i as f64 * 0.5).collect();
    let frame = Table::from_rows(100, 3, &values)
        .unwrap()
        .with_column_labels(vec!["A".into(), "B".into(), "C".into()])
        .unwrap();

    c.data().add("testdata", frame.clone()).unwrap();

    assert_eq!(c.data().format_of("testdata").unwrap(), Some(Format::Tabular));
    assert!(c.basedir().join("testdata/tabular.db").is_file());
    let back = c.data().get("testdata").unwrap().unwrap();
    assert_eq!(back.as_table(), Some(&frame));
}

#[test]
fn test_series_round_trip() {
    let (_tmp, c) = container();
    let series = Table::series(ColumnData::Float((0..50).map(|i| i as f64).collect()))
        .with_name("energy")
        .with_index((0..50).map(|i| Label::Int(i * 10)).collect())
        .unwrap();

    c.data().add("series", series.clone()).unwrap();
    let back = c.data().get("series").unwrap().unwrap();
    let table = back.as_table().unwrap();
    assert_eq!(table.kind(), TableKind::Series);
    assert_eq!(table, &series);
}

#[test]
fn test_single_row_and_single_column_tables() {
    let (_tmp, c) = container();
    let row = Table::from_rows(1, 4, &[1.0, 2.0, 3.0, 4.0]).unwrap();
    let col = Table::from_rows(4, 1, &[1.0, 2.0, 3.0, 4.0]).unwrap();

    c.data().add("row", row.clone()).unwrap();
    c.data().add("col", col.clone()).unwrap();

    assert_eq!(c.data().get("row").unwrap().unwrap().as_table(), Some(&row));
    assert_eq!(c.data().get("col").unwrap().unwrap().as_table(), Some(&col));
}

#[test]
fn test_blank_tables() {
    let (_tmp, c) = container();
    let empty = Table::zeros(0, 0);
    let no_rows = Table::frame(vec![
        Column::new("t", ColumnData::Float(vec![])),
        Column::new("label", ColumnData::Text(vec![])),
    ])
    .unwrap();

    c.data().add("empty", empty.clone()).unwrap();
    c.data().add("no_rows", no_rows.clone()).unwrap();

    assert_eq!(c.data().get("empty").unwrap().unwrap().as_table(), Some(&empty));
    assert_eq!(c.data().get("no_rows").unwrap().unwrap().as_table(), Some(&no_rows));
}

#[test]
fn test_mixed_column_types() {
    let (_tmp, c) = container();
    let frame = Table::frame(vec![
        Column::new("step", ColumnData::Int(vec![0, 1, 2])),
        Column::new("phase", ColumnData::Text(vec!["a".into(), "b".into(), "c".into()])),
        Column::new("rmsd", ColumnData::Float(vec![0.0, 1.25, f64::NAN])),
    ])
    .unwrap();

    c.data().add("mixed", frame).unwrap();
    let back = c.data().get("mixed").unwrap().unwrap();
    let table = back.as_table().unwrap();
    assert_eq!(table.columns()[0].data, ColumnData::Int(vec![0, 1, 2]));
    match &table.columns()[2].data {
        ColumnData::Float(v) => {
            assert_eq!(&v[..2], &[0.0, 1.25]);
            assert!(v[2].is_nan());
        }
        other => panic!("expected floats, got {:?}", other),
    }
}

#[test]
fn test_arrays_round_trip() {
    let (_tmp, c) = container();
    let cube = NdArray::from_fn(vec![4, 3, 2], |i| i as f64 / 7.0);
    let ints = NdArray::from_i64(vec![2, 2], vec![1, -2, 3, -4]).unwrap();

    c.data().add("cube", cube.clone()).unwrap();
    c.data().add("ints", ints.clone()).unwrap();

    assert_eq!(c.data().format_of("cube").unwrap(), Some(Format::Array));
    assert_eq!(c.data().get("cube").unwrap().unwrap().as_array(), Some(&cube));
    assert_eq!(c.data().get("ints").unwrap().unwrap().as_array(), Some(&ints));
}

#[test]
fn test_scalar_array() {
    let (_tmp, c) = container();
    c.data().add("scalar", NdArray::scalar(20.0)).unwrap();
    let back = c.data().get("scalar").unwrap().unwrap();
    let array = back.as_array().unwrap();
    assert_eq!(array.ndim(), 0);
    assert_eq!(array.as_f64(), Some(&[20.0][..]));
}

#[test]
fn test_nested_generic_structures() {
    let (_tmp, c) = container();
    let value = Generic::List(vec![
        Generic::from("arthur"),
        Generic::Tuple(vec![1.into(), NdArray::zeros(vec![2, 2]).into()]),
        Generic::dict([
            ("pure", Generic::from("galahad")),
            (
                "inner",
                Generic::set(vec![Generic::from(3.14159), Generic::from("seahorses")]),
            ),
            ("array", NdArray::from_fn(vec![3], |i| i as f64).into()),
        ]),
        Generic::None,
        Generic::Bytes(vec![0, 255, 7]),
    ]);

    c.data().add("nested", value.clone()).unwrap();
    assert_eq!(c.data().format_of("nested").unwrap(), Some(Format::Generic));
    assert_eq!(
        c.data().get("nested").unwrap().unwrap().as_generic(),
        Some(&value)
    );
}

#[test]
fn test_overwrite_switches_format() {
    let (_tmp, c) = container();
    c.data().add("testdata", Table::zeros(10, 2)).unwrap();
    c.data().add("testdata", 23).unwrap();

    assert_eq!(c.data().format_of("testdata").unwrap(), Some(Format::Generic));
    assert_eq!(
        c.data().get("testdata").unwrap().unwrap(),
        Payload::Generic(Generic::Int(23))
    );
    // Files of the previous format are gone.
    assert!(!c.basedir().join("testdata/tabular.db").exists());

    c.data().set("testdata", NdArray::scalar_i64(23)).unwrap();
    assert_eq!(c.data().format_of("testdata").unwrap(), Some(Format::Array));
    assert!(!c.basedir().join("testdata/generic.bin").exists());
}

#[test]
fn test_nested_handles_and_keys() {
    let (_tmp, c) = container();
    c.data().add("a", 1).unwrap();
    c.data().add("runs/01/energy", NdArray::zeros(vec![3])).unwrap();
    c.data().add("runs/02/energy", NdArray::zeros(vec![3])).unwrap();

    assert_eq!(
        c.data().keys().unwrap(),
        vec!["a", "runs/01/energy", "runs/02/energy"]
    );
    assert_eq!(
        c.data().locate("runs/01/energy").unwrap(),
        c.basedir().join("runs").join("01").join("energy")
    );
    assert!(c.data().contains("runs/02/energy").unwrap());
    assert!(!c.data().contains("runs").unwrap());
}

#[test]
fn test_remove_prunes_and_is_idempotent() {
    let (_tmp, c) = container();
    c.data().add("deep/inside/value", 5).unwrap();
    c.data().add("deep/sibling", 6).unwrap();

    c.data().remove("deep/inside/value").unwrap();
    assert!(!c.basedir().join("deep/inside").exists());
    assert!(c.basedir().join("deep/sibling").exists());
    assert_eq!(c.data().get("deep/inside/value").unwrap(), None);

    c.data().remove("deep/inside/value").unwrap();
    c.data().remove("never-added").unwrap();

    c.data().clear().unwrap();
    assert!(c.data().keys().unwrap().is_empty());
    assert!(!c.basedir().join("deep").exists());
}

#[test]
fn test_invalid_handles() {
    let (_tmp, c) = container();
    for bad in ["", "../escape", "a//b", ".hidden"] {
        let err = c.data().add(bad, 1).unwrap_err();
        assert!(matches!(err, StoreError::ValidationError(_)), "{:?}", bad);
    }
}

#[test]
fn test_ragged_table_is_unsupported() {
    let err = Table::frame(vec![
        Column::new("A", ColumnData::Float(vec![1.0, 2.0])),
        Column::new("B", ColumnData::Int(vec![1])),
    ])
    .unwrap_err();
    assert!(matches!(err, StoreError::UnsupportedPayload(_)));

    let err = NdArray::from_f64(vec![3, 3], vec![0.0; 8]).unwrap_err();
    assert!(matches!(err, StoreError::UnsupportedPayload(_)));
}

#[test]
fn test_tampered_payload_is_corrupt() {
    let tmp = tempdir().unwrap();
    let config = simstore::StoreConfig {
        read_retries: 1,
        lock_retry_ms: 1,
        ..Default::default()
    };
    let c = Container::create_or_load_with_config(tmp.path(), "tampered", &config).unwrap();
    c.data().add("arr", NdArray::zeros(vec![4])).unwrap();

    fs::write(c.basedir().join("arr/array.bin"), b"garbage").unwrap();
    let err = c.data().get("arr").unwrap_err();
    assert!(matches!(err, StoreError::CorruptData { .. }));

    fs::remove_file(c.basedir().join("arr/array.bin")).unwrap();
    let err = c.data().get("arr").unwrap_err();
    assert!(matches!(err, StoreError::CorruptData { .. }));
}

#[test]
fn test_payload_without_manifest_is_discovered() {
    let (_tmp, c) = container();
    c.data().add("legacy", Generic::from("kept")).unwrap();
    fs::remove_file(c.basedir().join("legacy").join(MANIFEST_FILE_NAME)).unwrap();

    assert_eq!(c.data().format_of("legacy").unwrap(), Some(Format::Generic));
    assert_eq!(
        c.data().get("legacy").unwrap().unwrap(),
        Payload::from("kept")
    );
}

#[test]
fn test_data_does_not_touch_state() {
    let tmp = tempdir().unwrap();
    let s = Sim::create_or_load(tmp.path(), "sim").unwrap();
    s.tags().add(["before"]).unwrap();
    let before = s.state().unwrap();

    s.data().add("positions", NdArray::zeros(vec![10, 3])).unwrap();
    assert_eq!(s.state().unwrap(), before);

    let ops: Vec<String> = s.journal().events().unwrap().into_iter().map(|e| e.op).collect();
    assert_eq!(ops.last().map(String::as_str), Some("data.add"));
}

#[test]
fn test_payloads_round_trip_and_remove_their_files() {
    let (_tmp, c) = container();
    let cases: Vec<(&str, Payload, &str)> = vec![
        ("frame", Table::zeros(10, 10).into(), "tabular.db"),
        ("line", NdArray::from_fn(vec![6], |i| i as f64 * 1.5).into(), "array.bin"),
        (
            "hyper",
            NdArray::from_fn(vec![2, 3, 4, 5], |i| i as f64).into(),
            "array.bin",
        ),
        (
            "object",
            Generic::dict([("lancelot", Generic::from(3)), ("robin", Generic::None)]).into(),
            "generic.bin",
        ),
    ];

    for (handle, payload, file) in cases {
        c.data().add(handle, payload.clone()).unwrap();
        assert_eq!(c.data().get(handle).unwrap(), Some(payload), "{}", handle);
        let backing = c.basedir().join(handle).join(file);
        assert!(backing.is_file(), "{}", handle);

        c.data().remove(handle).unwrap();
        assert!(!backing.exists(), "{}", handle);
        assert!(!c.data().contains(handle).unwrap());
    }
}

#[test]
fn test_hostile_payload_without_manifest_is_corrupt() {
    let tmp = tempdir().unwrap();
    let config = simstore::StoreConfig {
        read_retries: 0,
        ..Default::default()
    };
    let c = Container::create_or_load_with_config(tmp.path(), "hostile", &config).unwrap();
    c.data().add("h", Generic::from("v")).unwrap();
    let dir = c.basedir().join("h");
    fs::remove_file(dir.join(MANIFEST_FILE_NAME)).unwrap();
    fs::write(dir.join("generic.bin"), [0xffu8; 64]).unwrap();

    let err = c.data().get("h").unwrap_err();
    assert!(matches!(err, StoreError::CorruptData { .. }));
}

#[test]
fn test_reserved_handle_names_are_rejected() {
    let (_tmp, c) = container();
    let state_like = format!("Container.{}.json", simstore::core::time::new_record_id());
    for bad in [state_like.as_str(), "manifest.json", "runs/array.bin", "generic.bin/x"] {
        let err = c.data().add(bad, 1).unwrap_err();
        assert!(matches!(err, StoreError::ValidationError(_)), "{:?}", bad);
    }

    // A stray directory shaped like a state document does not break regeneration.
    fs::create_dir_all(c.basedir().join(&state_like)).unwrap();
    let again = Container::create_or_load(c.location(), "testcontainer").unwrap();
    assert_eq!(again.uuid(), c.uuid());
}
