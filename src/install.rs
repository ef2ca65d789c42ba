//! The seam between the parser and whatever writes firmware.
//!
//! The parser never retains payload bytes: content is handed over in
//! block-sized chunks as it is decoded.  Every argument is a borrowed view
//! valid only for the duration of the call — an installer that needs to
//! retain anything must copy it.

use crate::payload::Payload;

/// Receives payload content during parsing.
///
/// For each payload, [`prepare`](Self::prepare) is called exactly once
/// before any content, then [`write`](Self::write) is called repeatedly
/// with strictly increasing `offset` until `offset + chunk.len()` reaches
/// `total_size`.  Zero-length files produce a `prepare` call and no writes.
///
/// Returning an error from either method aborts the whole parse
/// immediately; the error is propagated verbatim as
/// [`ParseError::Install`](crate::ParseError::Install).  This is the
/// backpressure/abort channel — e.g. an installer that runs out of storage
/// simply fails the current write.
pub trait Installer {
    /// A payload's content archive is about to start.  `payload.meta_data`
    /// is already attached if the artifact carried any.
    fn prepare(&mut self, payload: &Payload) -> anyhow::Result<()>;

    /// One chunk of a content file, at most one block long.
    ///
    /// `filename` is the entry name inside the payload archive (e.g.
    /// `0000.ext4`), `total_size` its declared length and `offset` the
    /// position of `chunk` within it.
    fn write(
        &mut self,
        payload: &Payload,
        filename: &str,
        total_size: u64,
        offset: u64,
        chunk: &[u8],
    ) -> anyhow::Result<()>;
}
