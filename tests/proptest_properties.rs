//! Property tests for the universal properties in spec.md §8: round-trip,
//! idempotent insert-or-update, and point-search soundness/completeness,
//! exercised with randomly generated keys and payloads rather than the
//! fixed examples the per-engine unit/integration tests use.

use std::collections::BTreeSet;

use ixengine::{
    BPlusTree, BTreePaths, EngineParams, ExtendibleHashing, HashingPaths, Record, SeqFilePaths,
    SequentialFile, TrackRecord,
};
use proptest::prelude::*;

fn arb_short_key() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9]{1,12}"
}

fn arb_record(key: String) -> impl Strategy<Value = TrackRecord> {
    (
        "[a-zA-Z0-9 ]{0,30}",
        any::<i32>(),
        -1.0e6f32..1.0e6f32,
        -1.0e6f32..1.0e6f32,
        any::<i32>(),
        proptest::collection::vec(-1.0e6f32..1.0e6f32, 4..=4),
    )
        .prop_map(
            move |(name, popularity, acousticness, instrumentalness, duration_ms, embedding)| {
                TrackRecord {
                    track_id: key.clone(),
                    track_name: name,
                    track_artist: "artist".to_string(),
                    track_popularity: popularity,
                    track_album_id: "album".to_string(),
                    track_album_name: "album name".to_string(),
                    track_album_release_date: "2020-01-01".to_string(),
                    acousticness,
                    instrumentalness,
                    duration_ms,
                    embedding,
                }
            },
        )
}

fn arb_distinct_keys(max: usize) -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec(arb_short_key(), 1..=max)
        .prop_map(|keys| keys.into_iter().collect::<BTreeSet<_>>().into_iter().collect())
}

fn open_btree(dir: &tempfile::TempDir) -> BPlusTree<TrackRecord> {
    let paths = BTreePaths {
        index_file: dir.path().join("idx").to_string_lossy().into_owned(),
        data_file: dir.path().join("dat").to_string_lossy().into_owned(),
    };
    BPlusTree::open(&paths, EngineParams { r: 4, m: 4, key_len: 30 }).unwrap()
}

fn open_hashing(dir: &tempfile::TempDir) -> ExtendibleHashing<TrackRecord> {
    let paths = HashingPaths {
        directory_file: dir.path().join("dir").to_string_lossy().into_owned(),
        data_file: dir.path().join("buckets").to_string_lossy().into_owned(),
    };
    ExtendibleHashing::open(&paths, EngineParams { r: 40, m: 2, key_len: 30 }).unwrap()
}

fn open_seqfile(dir: &tempfile::TempDir) -> SequentialFile<TrackRecord> {
    let paths = SeqFilePaths {
        main_file: dir.path().join("main").to_string_lossy().into_owned(),
        aux_file: dir.path().join("aux").to_string_lossy().into_owned(),
    };
    SequentialFile::open(&paths).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property 1: pack/unpack is identity for any record whose fields fit
    /// their declared widths.
    #[test]
    fn record_round_trip_is_identity(key in "[a-zA-Z0-9]{0,30}", record in arb_record("placeholder".to_string())) {
        let record = TrackRecord { track_id: key, ..record };
        let packed = record.pack().unwrap();
        let back = TrackRecord::unpack(&packed);
        prop_assert_eq!(record, back);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Property 2 (B+Tree): adding the same key twice overwrites rather
    /// than duplicating.
    #[test]
    fn btree_add_twice_is_idempotent(key in arb_short_key(), r1 in arb_record("k".to_string()), r2 in arb_record("k".to_string())) {
        let dir = tempfile::tempdir().unwrap();
        let mut tree = open_btree(&dir);
        let r1 = TrackRecord { track_id: key.clone(), ..r1 };
        let r2 = TrackRecord { track_id: key.clone(), ..r2 };
        tree.add(r1).unwrap();
        tree.add(r2.clone()).unwrap();
        prop_assert_eq!(tree.search(&key).unwrap(), Some(r2));
        prop_assert_eq!(tree.leaf_chain_records().unwrap().len(), 1);
    }

    /// Properties 3/4 (B+Tree): every inserted-and-not-removed key is
    /// found with its last-written payload; every other key is not found.
    #[test]
    fn btree_search_is_sound_and_complete(keys in arb_distinct_keys(20), probe in arb_short_key()) {
        let dir = tempfile::tempdir().unwrap();
        let mut tree = open_btree(&dir);
        let mut expected = std::collections::BTreeMap::new();
        for key in &keys {
            let record = TrackRecord { track_id: key.clone(), ..Default::default() };
            tree.add(record.clone()).unwrap();
            expected.insert(key.clone(), record);
        }
        for (key, record) in &expected {
            prop_assert_eq!(tree.search(key).unwrap(), Some(record.clone()));
        }
        if !expected.contains_key(&probe) {
            prop_assert_eq!(tree.search(&probe).unwrap(), None);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Property 2 (Extendible Hashing): adding the same key twice
    /// overwrites rather than duplicating.
    #[test]
    fn hashing_add_twice_is_idempotent(key in arb_short_key(), r1 in arb_record("k".to_string()), r2 in arb_record("k".to_string())) {
        let dir = tempfile::tempdir().unwrap();
        let mut h = open_hashing(&dir);
        let r1 = TrackRecord { track_id: key.clone(), ..r1 };
        let r2 = TrackRecord { track_id: key.clone(), ..r2 };
        h.add(r1).unwrap();
        h.add(r2.clone()).unwrap();
        prop_assert_eq!(h.search(&key).unwrap(), Some(r2));
    }

    /// Properties 3/4 (Extendible Hashing): soundness/completeness.
    #[test]
    fn hashing_search_is_sound_and_complete(keys in arb_distinct_keys(20), probe in arb_short_key()) {
        let dir = tempfile::tempdir().unwrap();
        let mut h = open_hashing(&dir);
        let mut expected = std::collections::BTreeMap::new();
        for key in &keys {
            let record = TrackRecord { track_id: key.clone(), ..Default::default() };
            h.add(record.clone()).unwrap();
            expected.insert(key.clone(), record);
        }
        for (key, record) in &expected {
            prop_assert_eq!(h.search(key).unwrap(), Some(record.clone()));
        }
        if !expected.contains_key(&probe) {
            prop_assert_eq!(h.search(&probe).unwrap(), None);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Property 2 (Sequential File): adding the same key twice before any
    /// reconstruction overwrites the aux entry rather than duplicating it.
    #[test]
    fn seqfile_add_twice_is_idempotent(key in arb_short_key(), r1 in arb_record("k".to_string()), r2 in arb_record("k".to_string())) {
        let dir = tempfile::tempdir().unwrap();
        let mut sf = open_seqfile(&dir);
        let r1 = TrackRecord { track_id: key.clone(), ..r1 };
        let r2 = TrackRecord { track_id: key.clone(), ..r2 };
        sf.add(r1).unwrap();
        sf.add(r2.clone()).unwrap();
        prop_assert_eq!(sf.search(&key).unwrap(), Some(r2));
        prop_assert_eq!(sf.aux_len().unwrap(), 1);
    }

    /// Properties 3/4 (Sequential File): soundness/completeness, including
    /// across a forced reconstruction.
    #[test]
    fn seqfile_search_is_sound_and_complete(keys in arb_distinct_keys(20), probe in arb_short_key()) {
        let dir = tempfile::tempdir().unwrap();
        let mut sf = open_seqfile(&dir);
        let mut expected = std::collections::BTreeMap::new();
        for key in &keys {
            let record = TrackRecord { track_id: key.clone(), ..Default::default() };
            sf.add(record.clone()).unwrap();
            expected.insert(key.clone(), record);
        }
        for (key, record) in &expected {
            prop_assert_eq!(sf.search(key).unwrap(), Some(record.clone()));
        }
        if !expected.contains_key(&probe) {
            prop_assert_eq!(sf.search(&probe).unwrap(), None);
        }
    }
}
