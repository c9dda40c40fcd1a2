//! Simulates a crash between a write batch's records and its commit marker by truncating the
//! marker off the data file after a real commit, then reopening.

use std::fs::OpenOptions;

use caskdb::data::{data_file_name, key_with_seq, LogRecord, LogRecordKind};
use caskdb::{Engine, Error, Options, WriteBatchOptions};

fn opts(dir: &std::path::Path) -> Options {
    Options { dirpath: dir.to_path_buf(), data_file_size: 1024 * 1024, ..Options::default() }
}

#[test]
fn batch_truncated_before_commit_marker_is_entirely_invisible() {
    let dir = tempfile::tempdir().unwrap();

    {
        let engine = Engine::open(opts(dir.path())).unwrap();
        let batch = engine.new_write_batch(WriteBatchOptions { sync_writes: true, ..WriteBatchOptions::default() });
        batch.put(b"a", b"1").unwrap();
        batch.put(b"b", b"2").unwrap();
        batch.put(b"c", b"3").unwrap();
        batch.commit().unwrap();

        assert_eq!(engine.get(b"a").unwrap(), b"1");
    }

    // This is the only commit that has ever happened against a fresh database, so its sequence
    // number is known: 1. Rebuild the exact bytes of its commit marker and chop them off the
    // tail of the active file, leaving the three staged records but no proof they were finished.
    let marker = LogRecord { key: key_with_seq(b"txn-fin", 1), value: Vec::new(), kind: LogRecordKind::TxnCommit };
    let (_, marker_len) = marker.encode();

    let data_path = dir.path().join(data_file_name(0));
    let file = OpenOptions::new().write(true).open(&data_path).unwrap();
    let current_len = file.metadata().unwrap().len();
    file.set_len(current_len - marker_len as u64).unwrap();
    drop(file);

    let engine = Engine::open(opts(dir.path())).unwrap();
    assert!(matches!(engine.get(b"a"), Err(Error::KeyNotFind)));
    assert!(matches!(engine.get(b"b"), Err(Error::KeyNotFind)));
    assert!(matches!(engine.get(b"c"), Err(Error::KeyNotFind)));
    assert!(engine.list_keys().is_empty());

    // The engine stays usable afterwards; the dropped batch isn't resurrected by further writes.
    engine.put(b"d", b"4").unwrap();
    assert_eq!(engine.get(b"d").unwrap(), b"4");
}
