//! Disk-resident index engines over fixed-layout records: a B+Tree, an
//! Extendible Hashing file, and a Sequential File, all generic over any
//! [`record::Record`] implementation.

pub mod btree;
pub mod config;
pub mod error;
pub mod hashing;
mod paging;
pub mod record;
pub mod seqfile;

pub use btree::BPlusTree;
pub use config::{BTreePaths, EngineParams, HashingPaths, SeqFilePaths};
pub use error::{EngineError, Result};
pub use hashing::ExtendibleHashing;
pub use record::{Record, TrackRecord};
pub use seqfile::SequentialFile;
