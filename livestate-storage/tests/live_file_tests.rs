//! Host filesystem behavior of the cache controller.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use livestate_storage::LiveFile;
use livestate_test_utils::{init_test_tracing, TempState, TestData};

/// Give coarse filesystem clocks time to tick past the last write.
fn settle() {
    thread::sleep(Duration::from_millis(50));
}

fn default_data() -> TestData {
    TestData::new(42, "test")
}

#[test]
fn test_simple() {
    init_test_tracing();
    let state = TempState::new();
    let f = LiveFile::new(state.path(), default_data);

    f.view(|data| {
        assert_eq!(data.value, 42);
        assert_eq!(data.name, "test");
    });

    assert_eq!(f.peek(), TestData::new(42, "test"));

    f.update(|data| {
        data.value = 100;
        Ok::<_, ()>(())
    })
    .unwrap();

    assert_eq!(f.peek(), TestData::new(100, "test"));
    assert_eq!(
        state.read().unwrap(),
        "{\n  \"Value\": 100,\n  \"Name\": \"test\"\n}\n"
    );
}

#[test]
fn test_file_isnt_created_before_first_update() {
    let state = TempState::new();
    let f = LiveFile::new(state.path(), default_data);
    assert!(!state.exists());

    assert_eq!(f.peek(), default_data());
    f.view(|_| ());
    assert!(!state.exists());

    f.update(|data| {
        data.value = 100;
        Ok::<_, ()>(())
    })
    .unwrap();
    assert!(state.exists());
}

#[test]
fn test_update_error_will_rollback_changes() {
    let state = TempState::new();
    let f = LiveFile::new(state.path(), default_data);

    let err = f
        .update(|data| {
            data.name = "updated".to_string();
            Err::<(), _>("something failed")
        })
        .unwrap_err();
    assert!(err.is_rejected());
    assert_eq!(f.peek().name, "test");
    assert!(!state.exists());

    f.update(|data| {
        data.name = "asdf".to_string();
        Ok::<_, &str>(())
    })
    .unwrap();
    let committed = state.read().unwrap();

    let err = f
        .update(|data| {
            data.name = "failure".to_string();
            Err::<(), _>("something failed")
        })
        .unwrap_err();
    assert_eq!(err.into_rejected(), Some("something failed"));
    assert_eq!(f.peek().name, "asdf");
    assert_eq!(state.read().unwrap(), committed);
}

#[test]
fn test_file_exists() {
    let state = TempState::new();
    state.write(r#"{"Value": 1337, "Name": "foobar"}"#);

    let f = LiveFile::new(state.path(), default_data);
    assert_eq!(f.peek(), TestData::new(1337, "foobar"));
}

#[test]
fn test_empty_file_keeps_default() {
    let state = TempState::new();
    state.write("");

    let f = LiveFile::new(state.path(), default_data);
    assert_eq!(f.peek(), default_data());
    assert_eq!(f.last_modified(), None);
}

#[test]
fn test_file_external_change() {
    let state = TempState::new();
    let f = LiveFile::new(state.path(), default_data);
    assert_eq!(f.peek(), default_data());

    state.write(r#"{"Value": 1337, "Name": "foobar"}"#);
    assert_eq!(f.peek(), TestData::new(1337, "foobar"));

    settle();
    state.write(r#"{"Value": 7, "Name": "again"}"#);
    f.view(|data| assert_eq!(data, &TestData::new(7, "again")));
}

#[test]
fn test_file_external_change_during_view() {
    let state = TempState::new();
    let f = LiveFile::new(state.path(), default_data);

    let (do_write_tx, do_write_rx) = mpsc::channel::<()>();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let path = state.path().to_path_buf();
    let writer = thread::spawn(move || {
        do_write_rx.recv().unwrap();
        std::fs::write(&path, r#"{"Value": 1337, "Name": "foobar"}"#).unwrap();
        done_tx.send(()).unwrap();
    });

    f.view(|data| {
        do_write_tx.send(()).unwrap();
        done_rx.recv().unwrap();
        assert_eq!(data.value, 42);
        assert_eq!(data.name, "test");
    });
    writer.join().unwrap();

    assert_eq!(f.peek(), TestData::new(1337, "foobar"));
}

#[test]
fn test_file_external_change_during_update() {
    let state = TempState::new();
    let f = LiveFile::new(state.path(), default_data);

    let (do_write_tx, do_write_rx) = mpsc::channel::<()>();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let path = state.path().to_path_buf();
    let writer = thread::spawn(move || {
        do_write_rx.recv().unwrap();
        std::fs::write(&path, r#"{"Value": 1337, "Name": "foobar"}"#).unwrap();
        done_tx.send(()).unwrap();
    });

    f.update(|data| {
        do_write_tx.send(()).unwrap();
        data.value = 100;
        done_rx.recv().unwrap();
        Ok::<_, ()>(())
    })
    .unwrap();
    writer.join().unwrap();

    // Last writer wins: the external change is overwritten.
    assert_eq!(f.peek().value, 100);
    let on_disk: TestData = serde_json::from_str(&state.read().unwrap()).unwrap();
    assert_eq!(on_disk, TestData::new(100, "test"));
}

#[test]
fn test_round_trip_through_new_instance() {
    let state = TempState::new();
    let first = LiveFile::new(state.path(), default_data);
    first
        .update(|data| {
            *data = TestData::new(-9, "ünïcödé \"quoted\"\n");
            Ok::<_, ()>(())
        })
        .unwrap();

    let second = LiveFile::new(state.path(), || TestData::new(0, "other default"));
    assert_eq!(second.peek(), TestData::new(-9, "ünïcödé \"quoted\"\n"));
}

#[test]
fn test_update_creates_missing_directories() {
    let state = TempState::new();
    let nested = state.dir().join("a/b/c/state.json");
    let f = LiveFile::new(&nested, default_data);

    f.update(|data| {
        data.value = 1;
        Ok::<_, ()>(())
    })
    .unwrap();

    assert!(nested.exists());
    assert_eq!(LiveFile::new(&nested, default_data).peek().value, 1);
}

#[test]
fn test_relative_path_uses_base_dir() {
    let state = TempState::new();
    let f = LiveFile::builder("nested/settings.json", default_data)
        .base_dir(state.dir())
        .build()
        .unwrap();
    assert_eq!(f.path(), state.dir().join("nested/settings.json"));

    f.update(|_| Ok::<_, ()>(())).unwrap();
    assert!(state.dir().join("nested/settings.json").exists());
}

#[test]
fn test_multiple_files_work_independently() {
    let one = TempState::new();
    let two = TempState::new();
    let f1 = LiveFile::new(one.path(), || TestData::new(111, "temp1"));
    let f2 = LiveFile::new(two.path(), || TestData::new(222, "temp2"));

    f1.update(|data| {
        data.value += 1;
        Ok::<_, ()>(())
    })
    .unwrap();

    assert_eq!(f1.peek(), TestData::new(112, "temp1"));
    assert_eq!(f2.peek(), TestData::new(222, "temp2"));
    assert!(!two.exists());
}

#[test]
fn test_zero_default_on_host_filesystem() {
    let state = TempState::new();
    let f = LiveFile::<TestData>::builder_with_zero_default(state.path())
        .build()
        .unwrap();
    assert_eq!(f.peek(), TestData::default());

    f.update(|data| {
        data.name = "set".to_string();
        Ok::<_, ()>(())
    })
    .unwrap();
    assert_eq!(f.peek().name, "set");
}

#[test]
fn test_deleted_file_keeps_last_value() {
    let state = TempState::new();
    state.write(r#"{"Value": 5, "Name": "five"}"#);
    let f = LiveFile::new(state.path(), default_data);
    assert_eq!(f.peek().value, 5);

    std::fs::remove_file(state.path()).unwrap();
    assert_eq!(f.peek().value, 5);
    assert!(f.last_modified().is_some());
}
