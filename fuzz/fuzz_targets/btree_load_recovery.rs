#![no_main]

use arbitrary::Arbitrary;
use ixengine::{BPlusTree, BTreePaths, EngineParams, Record, TrackRecord};
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
    let paths = BTreePaths {
        index_file: dir.path().join("idx").to_string_lossy().into_owned(),
        data_file: dir.path().join("dat").to_string_lossy().into_owned(),
    };
    let mut tree: BPlusTree<TrackRecord> =
        BPlusTree::open(&paths, EngineParams { r: 4, m: 4, key_len: 30 }).unwrap();

    for op in ops {
        match op {
            Op::Add(b) => {
                let key = key_for(b);
                tree.add(TrackRecord { track_id: key, ..Default::default() }).unwrap();
            }
            Op::Remove(b) => {
                let _ = tree.remove(&key_for(b)).unwrap();
            }
            Op::Search(b) => {
                let _ = tree.search(&key_for(b)).unwrap();
            }
        }
        assert!(tree.check_fanout_bounds().unwrap(), "node/page exceeded R/M bounds");
    }

    let chain = tree.leaf_chain_records().unwrap();
    let mut keys: Vec<&str> = chain.iter().map(|r| r.track_id.as_str()).collect();
    let sorted = {
        let mut k = keys.clone();
        k.sort();
        k
    };
    assert_eq!(keys, sorted, "leaf chain is not sorted after fuzzed load");
    keys.dedup();
    assert_eq!(keys.len(), sorted.len(), "leaf chain contains duplicate keys");
});
