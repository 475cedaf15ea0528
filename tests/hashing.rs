use ixengine::{EngineParams, ExtendibleHashing, HashingPaths, Record, TrackRecord};

fn open(dir: &tempfile::TempDir, m: usize) -> ExtendibleHashing<TrackRecord> {
    let paths = HashingPaths {
        directory_file: dir.path().join("dir").to_string_lossy().into_owned(),
        data_file: dir.path().join("buckets").to_string_lossy().into_owned(),
    };
    ExtendibleHashing::open(&paths, EngineParams { r: 40, m, key_len: 30 }).unwrap()
}

fn record(id: &str) -> TrackRecord {
    TrackRecord {
        track_id: id.to_string(),
        ..Default::default()
    }
}

#[test]
fn fresh_directory_starts_at_depth_two() {
    let dir = tempfile::tempdir().unwrap();
    let h = open(&dir, 20);
    assert_eq!(h.global_depth(), 2);
    assert_eq!(h.directory_len(), 4);
}

/// S3 (adapted, see the unit test of the same name in `src/hashing.rs`):
/// sustained inserts under a small bucket capacity eventually force the
/// directory to double, and every invariant holds at every step.
#[test]
fn s3_sustained_overflow_forces_directory_growth_without_losing_data() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = open(&dir, 2);
    for i in 0..400 {
        let key = format!("H{i:04}");
        h.add(record(&key)).unwrap();
        assert!(h.check_invariants().unwrap(), "invariant broken at {key}");
    }
    assert!(h.global_depth() > 2);
    for i in 0..400 {
        let key = format!("H{i:04}");
        assert_eq!(h.search(&key).unwrap().unwrap().track_id, key);
    }
}

#[test]
fn update_by_readd_overwrites_fields() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = open(&dir, 20);
    let mut first = record("x");
    first.duration_ms = 1000;
    h.add(first).unwrap();
    let mut second = record("x");
    second.duration_ms = 2000;
    h.add(second).unwrap();
    assert_eq!(h.search("x").unwrap().unwrap().duration_ms, 2000);
}

#[test]
fn remove_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = open(&dir, 20);
    h.add(record("gone")).unwrap();
    assert!(h.remove("gone").unwrap());
    assert!(!h.remove("gone").unwrap());
    assert_eq!(h.search("gone").unwrap(), None);
}

#[test]
fn survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let paths = HashingPaths {
        directory_file: dir.path().join("dir").to_string_lossy().into_owned(),
        data_file: dir.path().join("buckets").to_string_lossy().into_owned(),
    };
    {
        let mut h: ExtendibleHashing<TrackRecord> =
            ExtendibleHashing::open(&paths, EngineParams { r: 40, m: 2, key_len: 30 }).unwrap();
        for i in 0..120 {
            h.add(record(&format!("W{i:03}"))).unwrap();
        }
    }
    let mut h: ExtendibleHashing<TrackRecord> =
        ExtendibleHashing::open(&paths, EngineParams { r: 40, m: 2, key_len: 30 }).unwrap();
    assert_eq!(h.search("W042").unwrap().unwrap().track_id, "W042");
    assert!(h.check_invariants().unwrap());
}
