//! Incremental parser for nested-tar OTA update artifacts.
//!
//! An artifact is a tar container holding a `version` file, a `header.tar`
//! manifest archive and one `data/<n>.tar` content archive per payload.  The
//! parser consumes the byte stream exactly as it arrives from the transport
//! (HTTP body fragments of arbitrary size), never buffers more than the
//! current archive entry, and forwards payload content to an [`Installer`]
//! in 512-byte chunks.
//!
//! The caller owns the feed loop: [`ArtifactParser::feed`] returns
//! [`Status::NeedMore`] whenever the buffered bytes are insufficient to make
//! progress, and the caller is expected to fetch the next fragment and call
//! again.  [`parser::parse_from`] and [`parser::parse_from_async`] implement
//! that loop for `Read` / `AsyncRead` transports.

pub mod block;
pub mod buffer;
pub mod error;
pub mod install;
pub mod nesting;
pub mod parser;
pub mod payload;

pub use error::{ParseError, Result};
pub use install::Installer;
pub use parser::{parse_from, parse_from_async, ArtifactParser, Status};
pub use payload::Payload;

/// Tar wire-format unit.  Headers are exactly one block; entry content is
/// padded up to the next block boundary.
pub const BLOCK_SIZE: usize = 512;

/// Format literal the `version` file must declare.
pub const ARTIFACT_FORMAT: &str = "artifact";

/// Format version the `version` file must declare.
pub const ARTIFACT_VERSION: u64 = 3;
