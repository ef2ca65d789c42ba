//! Tracks the chain of archives currently open inside the artifact.
//!
//! The wire format carries no explicit nesting depth: an entry whose name
//! ends in `.tar` opens an inner archive whose own blocks follow inline, and
//! a double zero block closes the innermost open archive.  This is pure
//! stack bookkeeping — push on open, pop exactly one segment per end
//! marker, join with `/` when a logical name is needed.

use crate::error::{ParseError, Result};

/// Upper bound on nesting depth; real artifacts use three levels.
pub const MAX_DEPTH: usize = 8;

/// Stack of open archive names, innermost last.
#[derive(Debug, Default)]
pub struct ArchiveStack {
    segments: Vec<String>,
}

impl ArchiveStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Opens an inner archive.
    pub fn push(&mut self, name: String) -> Result<()> {
        if self.segments.len() == MAX_DEPTH {
            return Err(ParseError::TooDeep(MAX_DEPTH));
        }
        self.segments.push(name);
        Ok(())
    }

    /// Closes the innermost open archive.  Returns false when the stack is
    /// already empty, i.e. the end marker belongs to the top-level container.
    pub fn pop(&mut self) -> bool {
        self.segments.pop().is_some()
    }

    /// Joins the open chain with `entry` into the logical name used for
    /// handler dispatch, e.g. `header.tar/headers/0/meta-data`.
    pub fn logical_name(&self, entry: &str) -> String {
        if self.segments.is_empty() {
            return entry.to_owned();
        }
        let mut name = self.segments.join("/");
        name.push('/');
        name.push_str(entry);
        name
    }
}
