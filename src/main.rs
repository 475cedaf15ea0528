//! Thin REPL over a single index engine, chosen on the command line. Not a
//! query language front end: each command maps directly onto one engine
//! operation (`add`/`search`/`remove`/`range`), keyed by `track_id`.

use std::io::{self, Write};

use ixengine::{
    BPlusTree, BTreePaths, EngineParams, ExtendibleHashing, HashingPaths, Record, SeqFilePaths,
    SequentialFile, TrackRecord,
};

enum Engine {
    BTree(BPlusTree<TrackRecord>),
    Hashing(ExtendibleHashing<TrackRecord>),
    SeqFile(SequentialFile<TrackRecord>),
}

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let kind = match args.next() {
        Some(k) => k,
        None => {
            print_usage();
            std::process::exit(2);
        }
    };
    let prefix = args.next().unwrap_or_else(|| "ixengine_data".to_string());

    let mut engine = match open_engine(&kind, &prefix) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("ixengine: failed to open {kind} engine at {prefix}: {e}");
            std::process::exit(1);
        }
    };

    println!("ixengine - {kind} engine at '{prefix}'");
    println!("commands: add <key> | search <key> | remove <key> | range <begin> <end> | exit");

    loop {
        print!("ixengine> ");
        io::stdout().flush().ok();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).unwrap_or(0) == 0 {
            break;
        }
        let line = input.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") {
            break;
        }

        match run_command(&mut engine, line) {
            Ok(output) => println!("{output}"),
            Err(e) => eprintln!("error: {e}"),
        }
    }
}

fn print_usage() {
    eprintln!("usage: ixengine <btree|hash|seqfile> [file-prefix]");
}

fn open_engine(kind: &str, prefix: &str) -> ixengine::Result<Engine> {
    let params = EngineParams::default();
    match kind {
        "btree" => {
            let paths = BTreePaths {
                index_file: format!("{prefix}.idx"),
                data_file: format!("{prefix}.dat"),
            };
            Ok(Engine::BTree(BPlusTree::open(&paths, params)?))
        }
        "hash" => {
            let paths = HashingPaths {
                directory_file: format!("{prefix}.dir"),
                data_file: format!("{prefix}.buckets"),
            };
            Ok(Engine::Hashing(ExtendibleHashing::open(&paths, params)?))
        }
        "seqfile" => {
            let paths = SeqFilePaths {
                main_file: format!("{prefix}.main"),
                aux_file: format!("{prefix}.aux"),
            };
            Ok(Engine::SeqFile(SequentialFile::open(&paths)?))
        }
        other => {
            print_usage();
            Err(ixengine::EngineError::InvalidInput(format!(
                "unknown engine kind '{other}'"
            )))
        }
    }
}

fn run_command(engine: &mut Engine, line: &str) -> ixengine::Result<String> {
    let mut parts = line.split_whitespace();
    let cmd = parts.next().unwrap_or_default();
    match cmd {
        "add" => {
            let key = parts.next().unwrap_or_default().to_string();
            let record = TrackRecord {
                track_id: key.clone(),
                ..Default::default()
            };
            match engine {
                Engine::BTree(e) => e.add(record)?,
                Engine::Hashing(e) => e.add(record)?,
                Engine::SeqFile(e) => e.add(record)?,
            }
            Ok(format!("added '{key}'"))
        }
        "search" => {
            let key = parts.next().unwrap_or_default();
            let found = match engine {
                Engine::BTree(e) => e.search(key)?,
                Engine::Hashing(e) => e.search(key)?,
                Engine::SeqFile(e) => e.search(key)?,
            };
            Ok(match found {
                Some(r) => format!("found: {}", r.primary_key()),
                None => "not found".to_string(),
            })
        }
        "remove" => {
            let key = parts.next().unwrap_or_default();
            let removed = match engine {
                Engine::BTree(e) => e.remove(key)?,
                Engine::Hashing(e) => e.remove(key)?,
                Engine::SeqFile(e) => e.remove(key)?,
            };
            Ok(format!("removed: {removed}"))
        }
        "range" => {
            let begin = parts.next().unwrap_or_default();
            let end = parts.next().unwrap_or_default();
            let results: Vec<String> = match engine {
                Engine::BTree(e) => e
                    .range_search(begin, end)?
                    .into_iter()
                    .map(|r| r.primary_key())
                    .collect(),
                Engine::Hashing(_) => {
                    return Err(ixengine::EngineError::InvalidInput(
                        "extendible hashing has no range search".to_string(),
                    ))
                }
                Engine::SeqFile(e) => e
                    .range_search(begin, end)?
                    .into_iter()
                    .map(|r| r.primary_key())
                    .collect(),
            };
            Ok(format!("{} record(s): {}", results.len(), results.join(", ")))
        }
        other => Ok(format!("unknown command '{other}'")),
    }
}
