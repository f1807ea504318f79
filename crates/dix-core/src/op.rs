//! Operation kinds of the index client

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation carried by a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// Create component catalogues of indices
    Create,
    /// Delete component catalogues of indices
    Delete,
    /// Check that component catalogues of indices exist
    Lookup,
    /// List indices
    List,
    /// Insert records
    Put,
    /// Fetch values by key
    Get,
    /// Range scan from start keys
    Next,
    /// Remove records
    Del,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpKind::Create => "create",
            OpKind::Delete => "delete",
            OpKind::Lookup => "lookup",
            OpKind::List => "list",
            OpKind::Put => "put",
            OpKind::Get => "get",
            OpKind::Next => "next",
            OpKind::Del => "del",
        };
        write!(f, "{}", name)
    }
}
