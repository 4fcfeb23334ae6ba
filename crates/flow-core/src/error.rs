//! Error type shared by the flow crates.

use crate::id::CellId;
use std::fmt;
use thiserror::Error;

/// Which way a DSL conversion was running when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    TextToGraph,
    GraphToText,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::TextToGraph => f.write_str("text -> graph"),
            Direction::GraphToText => f.write_str("graph -> text"),
        }
    }
}

/// Errors raised by graph operations, collaborators and configuration.
#[derive(Debug, Error)]
pub enum FlowError {
    /// A cell ID does not resolve in the graph.
    #[error("unknown cell `{0}`")]
    UnknownCell(CellId),
    /// The cell exists but is not a link.
    #[error("cell `{0}` is not a link")]
    NotALink(CellId),
    /// The cell exists but is not a node.
    #[error("cell `{0}` is not a node")]
    NotANode(CellId),
    /// A cell ID is already in use.
    #[error("cell `{0}` already exists")]
    DuplicateCell(CellId),
    /// The metamodel rejected a DSL conversion.
    #[error("{direction} conversion failed: {message}")]
    Conversion {
        direction: Direction,
        message: String,
    },
    /// Any other metamodel failure (catalog load, validation).
    #[error("metamodel error: {0}")]
    Metamodel(String),
    /// The editor configuration could not be parsed.
    #[error("invalid editor config: {0}")]
    Config(#[from] serde_json::Error),
    /// The palette catalog supplied by the metamodel could not be parsed.
    #[error("invalid palette catalog: {0}")]
    Catalog(#[source] serde_json::Error),
    /// The editor is in read-only mode.
    #[error("editor is read-only")]
    ReadOnly,
    /// The editor session has shut down.
    #[error("editor session closed")]
    SessionClosed,
}

impl FlowError {
    pub fn conversion(direction: Direction, message: impl Into<String>) -> Self {
        FlowError::Conversion {
            direction,
            message: message.into(),
        }
    }
}
