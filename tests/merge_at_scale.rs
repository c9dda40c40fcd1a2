//! The literal merge scenario: a thousand keys, eight hundred deleted, compact, reopen.

use caskdb::{Engine, Options};

fn opts(dir: &std::path::Path) -> Options {
    Options { dirpath: dir.to_path_buf(), data_file_size: 32 * 1024, ..Options::default() }
}

#[test]
fn merge_reclaims_deleted_keys_and_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(opts(dir.path())).unwrap();

    for i in 0..1000u32 {
        engine.put(format!("key-{i:04}").as_bytes(), b"some reasonably sized payload value").unwrap();
    }
    for i in 0..800u32 {
        engine.delete(format!("key-{i:04}").as_bytes()).unwrap();
    }

    engine.merge().unwrap();
    let stat_before_close = engine.stat().unwrap();
    assert_eq!(stat_before_close.key_count, 200);
    drop(engine);

    let engine = Engine::open(opts(dir.path())).unwrap();
    assert_eq!(engine.list_keys().len(), 200);
    for i in 800..1000u32 {
        assert_eq!(engine.get(format!("key-{i:04}").as_bytes()).unwrap(), b"some reasonably sized payload value");
    }
    for i in 0..800u32 {
        assert!(engine.get(format!("key-{i:04}").as_bytes()).is_err());
    }

    let stat = engine.stat().unwrap();
    assert_eq!(stat.key_count, 200);
    assert_eq!(stat.deleted_size, 0);
}
