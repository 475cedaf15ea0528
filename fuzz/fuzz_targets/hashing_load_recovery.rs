#![no_main]

use arbitrary::Arbitrary;
use ixengine::{EngineParams, ExtendibleHashing, HashingPaths, TrackRecord};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum Op {
    Add(u8),
    Remove(u8),
    Search(u8),
}

fn key_for(byte: u8) -> String {
    format!("K{:03}", byte % 64)
}

fuzz_target!(|ops: Vec<Op>| {
    let dir = tempfile::tempdir().unwrap();
    let paths = HashingPaths {
        directory_file: dir.path().join("dir").to_string_lossy().into_owned(),
        data_file: dir.path().join("buckets").to_string_lossy().into_owned(),
    };
    let mut hashing: ExtendibleHashing<TrackRecord> =
        ExtendibleHashing::open(&paths, EngineParams { r: 40, m: 2, key_len: 30 }).unwrap();

    for op in ops {
        match op {
            Op::Add(b) => {
                let key = key_for(b);
                hashing.add(TrackRecord { track_id: key, ..Default::default() }).unwrap();
            }
            Op::Remove(b) => {
                let _ = hashing.remove(&key_for(b)).unwrap();
            }
            Op::Search(b) => {
                let _ = hashing.search(&key_for(b)).unwrap();
            }
        }
        assert!(
            hashing.check_invariants().unwrap(),
            "directory/bucket depth invariant broken"
        );
    }
});
