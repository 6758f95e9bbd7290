//! Identifier validation and schema-qualified table names

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::error::{Error, Result};

static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("identifier regex is valid"));

/// A validated SQL identifier. Only ever rendered double-quoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident(String);

impl Ident {
    pub fn new(name: &str) -> Result<Self> {
        if IDENT_RE.is_match(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(Error::InvalidIdentifier(name.to_string()))
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

/// Fully qualified names of the tables the engine reads.
#[derive(Debug, Clone)]
pub struct TableNames {
    pub overview: String,
    pub attack: String,
    pub backrun: String,
}

impl TableNames {
    pub fn new(schema: &str, overview: &str, attack: &str, backrun: &str) -> Result<Self> {
        let schema = Ident::new(schema)?;
        let qualify = |table: &str| -> Result<String> {
            let table = Ident::new(table)?;
            Ok(format!("{}.{}", schema, table))
        };

        Ok(Self {
            overview: qualify(overview)?,
            attack: qualify(attack)?,
            backrun: qualify(backrun)?,
        })
    }

    /// Default layout written by the ingestion pipeline.
    pub fn with_schema(schema: &str) -> Result<Self> {
        Self::new(schema, "block_overview", "sandwich_attack", "sandwich_backrun")
    }
}
