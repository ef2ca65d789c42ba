//! Error types for artifact parsing.
//!
//! All fallible operations return [`Result<T>`], an alias for
//! `Result<T, ParseError>`.  "Not enough bytes buffered yet" is deliberately
//! *not* represented here: it is a normal suspend, reported through
//! [`Status::NeedMore`](crate::Status).  Every `ParseError` is terminal; the
//! parse context must be discarded by the owner once one is returned.

use std::collections::TryReserveError;

/// Result type alias for operations that may return a [`ParseError`].
pub type Result<T> = std::result::Result<T, ParseError>;

/// Terminal parse failures.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// A header block did not carry the `ustar` magic.
    #[error("bad header block magic (expected \"ustar\")")]
    BadMagic,

    /// The 12-byte size field was not a zero-padded octal number.
    #[error("invalid octal size field {0:?}")]
    InvalidSize(String),

    /// An entry name was not valid UTF-8.
    #[error("archive entry name is not valid UTF-8")]
    InvalidName,

    /// A zero-name block was not followed by a second zero block.  The wire
    /// format defines no single-zero-block construct.
    #[error("lone zero block inside archive")]
    LoneZeroBlock,

    /// Archives nested deeper than the supported limit.
    #[error("archives nested deeper than {0} levels")]
    TooDeep(usize),

    /// A whole-file-buffered JSON file exceeded the input cap.
    #[error("{name} is {size} bytes, larger than the {limit} byte limit")]
    OversizedJson { name: String, size: u64, limit: u64 },

    /// A version / header-info / meta-data file failed to parse as JSON or
    /// was missing a required field.
    #[error("malformed {name}")]
    Json {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// The `version` file declared a format or version we do not support.
    #[error("unsupported artifact (format {format:?}, version {version})")]
    VersionMismatch { format: String, version: u64 },

    /// The artifact ended without ever presenting a `version` file.
    #[error("artifact ended before a version file was seen")]
    MissingVersion,

    /// A second `header-info` file appeared; the payload table is populated
    /// exactly once.
    #[error("duplicate header-info file")]
    DuplicateHeaderInfo,

    /// A `headers/<n>/meta-data` or `data/<n>.tar` path referenced a payload
    /// index outside the table declared by header-info.
    #[error("payload index {index} out of range ({count} payloads declared)")]
    IndexOutOfRange { index: usize, count: usize },

    /// A path under `data/` did not match the `data/<n>.tar[/...]` shape.
    #[error("malformed payload path {0:?}")]
    BadPayloadPath(String),

    /// Growing the input buffer failed.
    #[error("input buffer allocation failed")]
    Alloc(#[from] TryReserveError),

    /// The installer callback refused a payload chunk.  Carries the
    /// installer's own error so the caller can report a meaningful
    /// deployment failure.
    #[error("installer rejected payload data")]
    Install(#[source] anyhow::Error),

    /// Transport error while driving the parser from a reader.
    #[error("transport error")]
    Io(#[from] std::io::Error),

    /// The byte stream ended in the middle of the artifact.
    #[error("stream ended in the middle of the artifact")]
    Truncated,

    /// The context already failed; it cannot be fed again.
    #[error("parse context already failed; create a new one")]
    Poisoned,
}
