//! # graphedit-core
//!
//! Data layer for graph-edit generation.
//!
//! This crate provides:
//! - Symbol dictionaries with reserved padding and blank-edge entries
//! - The graph data model (node sequence, typed edge matrix, node spans)
//! - Joint text/graph sequence assembly and batch padding helpers
//!
//! Key conventions:
//! - Padding always has id 0, the blank (no-edge) symbol always has id 1
//! - A graph's node sequence ends with a terminal stop symbol
//! - Edge matrices are square over the node sequence, `<blank>` for absent edges

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

pub mod encoding;
pub mod graph;

pub use encoding::{build_joint, pad_rows, JointEncoding};
pub use graph::{shifted_pair, Graph, GraphBuilder};

// ============================================================================
// Error Types
// ============================================================================

/// Errors in dictionary and graph construction
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),
    #[error("edge references node {index} but graph has {len} nodes")]
    NodeOutOfRange { index: usize, len: usize },
    #[error("edge matrix is {rows}x{cols}, expected {len}x{len}")]
    MatrixShape { rows: usize, cols: usize, len: usize },
    #[error("node span ({start}, {end}) exceeds {tokens} serialized tokens")]
    SpanOutOfRange {
        start: usize,
        end: usize,
        tokens: usize,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for core operations
pub type GraphResult<T> = Result<T, GraphError>;

// ============================================================================
// Symbol Dictionary
// ============================================================================

/// Reserved padding id, shared by every dictionary
pub const PAD_ID: usize = 0;

/// Reserved blank (no-edge) id, shared by every dictionary
pub const BLANK_ID: usize = 1;

/// Padding symbol string
pub const PAD_SYMBOL: &str = "<pad>";

/// Blank (no-edge) symbol string
pub const BLANK_SYMBOL: &str = "<blank>";

/// A fixed symbol <-> id table with reserved `<pad>` and `<blank>` entries.
///
/// Immutable after construction so that embedding and projection weights
/// indexed by these ids stay meaningful across training and inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dictionary {
    symbols: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Dictionary {
    /// Build a dictionary from the given symbols.
    ///
    /// `<pad>` and `<blank>` are prepended at ids 0 and 1; a repeated symbol
    /// (including the reserved two) is an error.
    pub fn new<I, S>(symbols: I) -> GraphResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut dict = Self {
            symbols: vec![PAD_SYMBOL.to_string(), BLANK_SYMBOL.to_string()],
            index: HashMap::new(),
        };
        for symbol in symbols {
            let symbol = symbol.into();
            if dict.symbols.contains(&symbol) {
                return Err(GraphError::DuplicateSymbol(symbol));
            }
            dict.symbols.push(symbol);
        }
        dict.rebuild_index();
        Ok(dict)
    }

    /// The reserved padding id
    pub fn pad(&self) -> usize {
        PAD_ID
    }

    /// The reserved blank (no-edge) id
    pub fn blank(&self) -> usize {
        BLANK_ID
    }

    /// Vocabulary size
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the dictionary holds only the reserved symbols
    pub fn is_empty(&self) -> bool {
        self.symbols.len() <= 2
    }

    /// Look up a symbol's id
    pub fn index(&self, symbol: &str) -> Option<usize> {
        self.index.get(symbol).copied()
    }

    /// Look up a symbol's id, failing on unknown symbols
    pub fn require(&self, symbol: &str) -> GraphResult<usize> {
        self.index(symbol)
            .ok_or_else(|| GraphError::UnknownSymbol(symbol.to_string()))
    }

    /// Look up the symbol string for an id
    pub fn symbol(&self, id: usize) -> Option<&str> {
        self.symbols.get(id).map(|s| s.as_str())
    }

    /// Save to a JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> GraphResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from a JSON file, rebuilding the reverse index
    pub fn load<P: AsRef<Path>>(path: P) -> GraphResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let mut dict: Self = serde_json::from_str(&json)?;
        dict.rebuild_index();
        Ok(dict)
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i))
            .collect();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_ids() {
        let dict = Dictionary::new(["a", "b"]).unwrap();
        assert_eq!(dict.pad(), 0);
        assert_eq!(dict.blank(), 1);
        assert_eq!(dict.symbol(0), Some("<pad>"));
        assert_eq!(dict.symbol(1), Some("<blank>"));
        assert_eq!(dict.len(), 4);
    }

    #[test]
    fn test_lookup_both_ways() {
        let dict = Dictionary::new(["start", "mid", "end"]).unwrap();
        let id = dict.index("mid").unwrap();
        assert_eq!(dict.symbol(id), Some("mid"));
        assert_eq!(dict.index("missing"), None);
        assert!(matches!(
            dict.require("missing"),
            Err(GraphError::UnknownSymbol(_))
        ));
    }

    #[test]
    fn test_duplicate_symbol_rejected() {
        assert!(matches!(
            Dictionary::new(["a", "a"]),
            Err(GraphError::DuplicateSymbol(_))
        ));
        assert!(matches!(
            Dictionary::new(["<pad>"]),
            Err(GraphError::DuplicateSymbol(_))
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let dict = Dictionary::new(["x", "y"]).unwrap();
        let path = std::env::temp_dir().join("graphedit_dict_test.json");
        dict.save(&path).unwrap();
        let loaded = Dictionary::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.len(), dict.len());
        assert_eq!(loaded.index("y"), dict.index("y"));
    }
}
