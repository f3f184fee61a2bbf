use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

/// One row of the mapping source: a character, its radical
/// decomposition, and its Cangjie key code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub character: String,
    pub radical: String,
    pub key: String,
}

/// The full character table, loaded once at startup and shared
/// read-only for the life of the process.
#[derive(Debug)]
pub struct MappingTable {
    records: Vec<Record>,
    index: HashMap<char, usize>,
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to read mapping table: {0}")]
    Io(#[from] std::io::Error),
    #[error("mapping table has no records")]
    Empty,
    #[error("line {line}: expected `character,radical,key`, found {fields} fields")]
    MalformedRecord { line: usize, fields: usize },
}

impl MappingTable {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Arc<Self>, TableError> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);

        let mut records = Vec::new();
        let mut index = HashMap::new();

        for (line_no, line) in reader.lines().enumerate() {
            let raw = line?;
            let row = raw.trim_end_matches('\r');
            if row.trim().is_empty() {
                continue;
            }

            let fields: Vec<&str> = row.split(',').collect();
            if fields.len() != 3 {
                return Err(TableError::MalformedRecord {
                    line: line_no + 1,
                    fields: fields.len(),
                });
            }

            let record = Record {
                character: fields[0].to_string(),
                radical: fields[1].to_string(),
                key: fields[2].to_string(),
            };

            match single_char(&record.character) {
                Some(c) => {
                    if index.contains_key(&c) {
                        warn!("line {}: duplicate entry for {:?}, keeping first", line_no + 1, c);
                    } else {
                        index.insert(c, records.len());
                    }
                }
                None => {
                    warn!(
                        "line {}: character field {:?} is not a single character and will never match",
                        line_no + 1,
                        record.character
                    );
                }
            }
            records.push(record);
        }

        if records.is_empty() {
            return Err(TableError::Empty);
        }

        info!("loaded {} mapping entries", records.len());
        Ok(Arc::new(Self { records, index }))
    }

    /// O(1) lookup. If the source held duplicate entries for a
    /// character, the first one loaded wins.
    pub fn lookup(&self, character: char) -> Option<&Record> {
        self.index.get(&character).map(|&i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

/// Resolves a query against the table: each character maps to its
/// record, most recently typed character first, and characters without
/// an entry are dropped. Total over any input; an empty query is a
/// valid "nothing entered yet" state and yields an empty result.
pub fn resolve<'a>(query: &str, table: &'a MappingTable) -> Vec<&'a Record> {
    query
        .chars()
        .rev()
        .filter_map(|c| table.lookup(c))
        .collect()
}
