//! The artifact state machine.
//!
//! [`ArtifactParser`] alternates between two phases: expecting a header
//! block and expecting the content of the entry that header described.
//! Each [`feed`](ArtifactParser::feed) call appends one transport fragment
//! to the input buffer and then loops, making as much progress as the
//! buffered bytes allow; when a handler cannot proceed the call returns
//! [`Status::NeedMore`] and the caller fetches the next fragment.
//!
//! Content is dispatched on the entry's logical name (the `/`-joined chain
//! of open archives plus the entry name) to one of five handlers: the
//! version gate, the header-info manifest reader, the per-payload meta-data
//! reader, the payload content streamer, and a skip handler for everything
//! unrecognized.  Entries named `*.tar` are nested archives whose blocks
//! follow inline; they open a new level instead of carrying content.
//!
//! All "is enough buffered" checks use the entry's on-wire footprint — the
//! declared size rounded up to a block multiple — so the buffer stays
//! block-aligned between entries.

use std::io::{ErrorKind, Read};

use log::{debug, trace};
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{
    block::{self, padded_size},
    buffer::ChunkBuffer,
    error::{ParseError, Result},
    install::Installer,
    nesting::ArchiveStack,
    payload::{HeaderInfo, Payload, VersionFile},
    ARTIFACT_FORMAT, ARTIFACT_VERSION, BLOCK_SIZE,
};

/// Cap on files that are buffered whole before JSON parsing (version,
/// header-info, meta-data).  Real manifests are a few hundred bytes; the
/// cap only bounds memory against hostile size fields.
const MAX_JSON_SIZE: u64 = 1 << 20;

/// Outcome of one [`ArtifactParser::feed`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The buffered bytes are exhausted; feed the next fragment.
    NeedMore,
    /// The artifact parsed completely.  Further feeds are no-ops.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header,
    Data,
    Done,
    Failed,
}

/// Progress of the inner parse loop.
enum Step {
    Continue,
    NeedMore,
    Finished,
}

/// How a content handler left the current entry.
enum Outcome {
    /// Not enough buffered bytes; re-run this handler later.
    NeedMore,
    /// The entry's content was fully consumed.
    Done,
    /// The entry is a nested archive: nothing consumed, its blocks follow.
    Opened,
}

#[derive(Debug, Default)]
struct CurrentFile {
    /// Name as written in the header block, e.g. `headers/0/meta-data`.
    entry_name: String,
    /// Name joined with the open archive chain, used for dispatch.
    logical: String,
    size: u64,
    /// Content bytes already delivered/discarded, `0 ..= size`.
    index: u64,
}

/// Which handler owns the content of the current entry.
#[derive(Debug, PartialEq)]
enum FileClass {
    Version,
    HeaderInfo,
    MetaData,
    PayloadData,
    Drop,
    ArchiveOpen,
}

fn classify(logical: &str) -> FileClass {
    if logical == "version" {
        FileClass::Version
    } else if logical == "header.tar/header-info" {
        FileClass::HeaderInfo
    } else if logical.starts_with("header.tar/headers/") && logical.ends_with("/meta-data") {
        FileClass::MetaData
    } else if logical.starts_with("data/") {
        FileClass::PayloadData
    } else if !logical.ends_with(".tar") {
        FileClass::Drop
    } else {
        FileClass::ArchiveOpen
    }
}

/// Extracts `<n>` from `header.tar/headers/<n>/meta-data`.
fn meta_data_index(logical: &str) -> Result<usize> {
    let bad = || ParseError::BadPayloadPath(logical.to_owned());

    let mut parts = logical.split('/');
    match (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) {
        (Some("header.tar"), Some("headers"), Some(index), Some("meta-data"), None) => {
            index.parse().map_err(|_| bad())
        }
        _ => Err(bad()),
    }
}

/// Splits `data/<n>.tar[/<file>]` into the payload index and the optional
/// inner file name.  `None` means the path names the content archive
/// itself — the "payload begins" marker.
fn payload_path(logical: &str) -> Result<(usize, Option<&str>)> {
    let bad = || ParseError::BadPayloadPath(logical.to_owned());

    let rest = logical.strip_prefix("data/").ok_or_else(bad)?;
    let (archive, inner) = match rest.split_once('/') {
        Some((archive, inner)) => (archive, Some(inner)),
        None => (rest, None),
    };
    let digits = archive.strip_suffix(".tar").ok_or_else(bad)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let index = digits.parse().map_err(|_| bad())?;
    Ok((index, inner))
}

/// Parse context for one in-flight artifact download.
///
/// Created before the first byte arrives, fed one fragment at a time and
/// dropped by the owner after [`Status::Done`] or the first error.  The
/// parser has no internal synchronization; the caller serializes all feeds.
#[derive(Debug)]
pub struct ArtifactParser {
    state: State,
    input: ChunkBuffer,
    stack: ArchiveStack,
    current: CurrentFile,
    payloads: Vec<Payload>,
    header_info_seen: bool,
    version_seen: bool,
    expected_format: String,
    expected_version: u64,
}

impl Default for ArtifactParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactParser {
    /// Context expecting [`ARTIFACT_FORMAT`] / [`ARTIFACT_VERSION`].
    pub fn new() -> Self {
        Self::with_expected(ARTIFACT_FORMAT, ARTIFACT_VERSION)
    }

    /// Context with an explicit format literal and version for the gate in
    /// the `version` handler.
    pub fn with_expected(format: impl Into<String>, version: u64) -> Self {
        ArtifactParser {
            state: State::Header,
            input: ChunkBuffer::new(),
            stack: ArchiveStack::new(),
            current: CurrentFile::default(),
            payloads: Vec::new(),
            header_info_seen: false,
            version_seen: false,
            expected_format: format.into(),
            expected_version: version,
        }
    }

    /// The payload table declared by header-info, in artifact order.
    /// Empty until `header.tar/header-info` has been parsed.
    pub fn payloads(&self) -> &[Payload] {
        &self.payloads
    }

    /// Feeds one transport fragment.  `data` may be empty to pump pending
    /// state without new bytes.
    ///
    /// Returns [`Status::NeedMore`] when the buffered bytes ran out,
    /// [`Status::Done`] once the artifact is complete.  Any error is
    /// terminal: the context is poisoned and must be discarded.
    pub fn feed(&mut self, data: &[u8], installer: &mut impl Installer) -> Result<Status> {
        match self.state {
            State::Done => return Ok(Status::Done),
            State::Failed => return Err(ParseError::Poisoned),
            State::Header | State::Data => {}
        }

        let result = self.run(data, installer);
        if result.is_err() {
            self.state = State::Failed;
        }
        result
    }

    fn run(&mut self, data: &[u8], installer: &mut impl Installer) -> Result<Status> {
        self.input.append(data)?;
        loop {
            let step = match self.state {
                State::Header => self.step_header()?,
                State::Data => self.step_data(installer)?,
                State::Done | State::Failed => unreachable!("terminal state inside run loop"),
            };
            match step {
                Step::Continue => {}
                Step::NeedMore => return Ok(Status::NeedMore),
                Step::Finished => {
                    self.state = State::Done;
                    debug!("artifact complete, {} payload(s)", self.payloads.len());
                    return Ok(Status::Done);
                }
            }
        }
    }

    /// One header-phase decision: decode an entry header, or recognize an
    /// end-of-archive marker (which needs two buffered blocks to confirm).
    fn step_header(&mut self) -> Result<Step> {
        if self.input.len() < BLOCK_SIZE {
            return Ok(Step::NeedMore);
        }

        if block::is_zero_name(self.input.bytes()) {
            if self.input.len() < 2 * BLOCK_SIZE {
                return Ok(Step::NeedMore);
            }
            if !block::is_zero_name(&self.input.bytes()[BLOCK_SIZE..]) {
                return Err(ParseError::LoneZeroBlock);
            }
            self.input.consume(2 * BLOCK_SIZE);
            if self.stack.pop() {
                trace!("archive closed, depth now {}", self.stack.depth());
                return Ok(Step::Continue);
            }
            // Top-level end-of-archive.
            if !self.version_seen {
                return Err(ParseError::MissingVersion);
            }
            return Ok(Step::Finished);
        }

        let header = block::decode(self.input.bytes())?;
        let logical = self.stack.logical_name(header.name);
        trace!("entry {:?}, {} bytes", logical, header.size);
        let current = CurrentFile {
            entry_name: header.name.to_owned(),
            logical,
            size: header.size,
            index: 0,
        };
        self.input.consume(BLOCK_SIZE);
        self.current = current;
        self.state = State::Data;
        Ok(Step::Continue)
    }

    /// Runs the handler owning the current entry's content.
    fn step_data(&mut self, installer: &mut impl Installer) -> Result<Step> {
        let outcome = match classify(&self.current.logical) {
            FileClass::Version => self.read_version()?,
            FileClass::HeaderInfo => self.read_header_info()?,
            FileClass::MetaData => self.read_meta_data()?,
            FileClass::PayloadData => self.stream_payload(installer)?,
            FileClass::Drop => self.drop_content()?,
            FileClass::ArchiveOpen => Outcome::Opened,
        };

        match outcome {
            Outcome::NeedMore => Ok(Step::NeedMore),
            Outcome::Done => {
                self.current = CurrentFile::default();
                self.state = State::Header;
                Ok(Step::Continue)
            }
            Outcome::Opened => {
                let name = std::mem::take(&mut self.current.entry_name);
                trace!("archive {:?} opened", name);
                self.stack.push(name)?;
                self.current = CurrentFile::default();
                self.state = State::Header;
                Ok(Step::Continue)
            }
        }
    }

    /// Whole-file gate for the JSON handlers: `None` while the entry's
    /// padded footprint is not fully buffered, otherwise the footprint.
    fn json_footprint(&self) -> Result<Option<usize>> {
        if self.current.size > MAX_JSON_SIZE {
            return Err(ParseError::OversizedJson {
                name: self.current.logical.clone(),
                size: self.current.size,
                limit: MAX_JSON_SIZE,
            });
        }
        let padded = padded_size(self.current.size);
        if (self.input.len() as u64) < padded {
            return Ok(None);
        }
        Ok(Some(padded as usize))
    }

    fn parse_json<T: DeserializeOwned>(&self) -> Result<T> {
        let raw = &self.input.bytes()[..self.current.size as usize];
        serde_json::from_slice(raw).map_err(|source| ParseError::Json {
            name: self.current.logical.clone(),
            source,
        })
    }

    /// `version`: the format gate.  Must match the expected literal and
    /// version number before anything else in the artifact is trusted.
    fn read_version(&mut self) -> Result<Outcome> {
        let Some(footprint) = self.json_footprint()? else {
            return Ok(Outcome::NeedMore);
        };
        let version: VersionFile = self.parse_json()?;
        if version.format != self.expected_format || version.version != self.expected_version {
            return Err(ParseError::VersionMismatch {
                format: version.format,
                version: version.version,
            });
        }
        debug!(
            "artifact format {:?} version {}",
            version.format, version.version
        );
        self.input.consume(footprint);
        self.version_seen = true;
        Ok(Outcome::Done)
    }

    /// `header.tar/header-info`: builds the payload table, fixed from here
    /// on.  Array order defines the indices later paths refer to.
    fn read_header_info(&mut self) -> Result<Outcome> {
        if self.header_info_seen {
            return Err(ParseError::DuplicateHeaderInfo);
        }
        let Some(footprint) = self.json_footprint()? else {
            return Ok(Outcome::NeedMore);
        };
        let info: HeaderInfo = self.parse_json()?;
        self.input.consume(footprint);
        self.payloads = info.payloads.into_iter().map(Payload::new).collect();
        self.header_info_seen = true;
        debug!("artifact declares {} payload(s)", self.payloads.len());
        Ok(Outcome::Done)
    }

    /// `header.tar/headers/<n>/meta-data`: attaches a JSON document to the
    /// indexed payload.  A zero-size entry means "no meta-data".
    fn read_meta_data(&mut self) -> Result<Outcome> {
        let index = meta_data_index(&self.current.logical)?;
        if index >= self.payloads.len() {
            return Err(ParseError::IndexOutOfRange {
                index,
                count: self.payloads.len(),
            });
        }
        if self.current.size == 0 {
            return Ok(Outcome::Done);
        }
        let Some(footprint) = self.json_footprint()? else {
            return Ok(Outcome::NeedMore);
        };
        let meta: serde_json::Value = self.parse_json()?;
        self.input.consume(footprint);
        self.payloads[index].meta_data = Some(meta);
        Ok(Outcome::Done)
    }

    /// `data/<n>.tar[/<file>]`: either the "payload begins" marker (the
    /// archive itself, no inner file component) or a content file streamed
    /// to the installer block by block.
    fn stream_payload(&mut self, installer: &mut impl Installer) -> Result<Outcome> {
        let (index, inner) = payload_path(&self.current.logical)?;
        if index >= self.payloads.len() {
            return Err(ParseError::IndexOutOfRange {
                index,
                count: self.payloads.len(),
            });
        }

        let Some(filename) = inner else {
            debug!(
                "payload {} ({}) begins",
                index, self.payloads[index].payload_type
            );
            installer
                .prepare(&self.payloads[index])
                .map_err(ParseError::Install)?;
            return Ok(Outcome::Opened);
        };

        while self.current.index < self.current.size {
            if self.input.len() < BLOCK_SIZE {
                return Ok(Outcome::NeedMore);
            }
            let remaining = self.current.size - self.current.index;
            let take = remaining.min(BLOCK_SIZE as u64) as usize;
            let chunk = &self.input.bytes()[..take];
            installer
                .write(
                    &self.payloads[index],
                    filename,
                    self.current.size,
                    self.current.index,
                    chunk,
                )
                .map_err(ParseError::Install)?;
            self.current.index += take as u64;
            // the final block is consumed padding included
            self.input.consume(BLOCK_SIZE);
        }
        Ok(Outcome::Done)
    }

    /// Skip handler for files no pattern recognizes: content is discarded
    /// in block units so the buffer stays aligned.
    fn drop_content(&mut self) -> Result<Outcome> {
        while self.current.index < self.current.size {
            if self.input.len() < BLOCK_SIZE {
                return Ok(Outcome::NeedMore);
            }
            let remaining = self.current.size - self.current.index;
            self.current.index += remaining.min(BLOCK_SIZE as u64);
            self.input.consume(BLOCK_SIZE);
        }
        Ok(Outcome::Done)
    }
}

/// Drives `parser` to completion from a blocking reader, e.g. a response
/// body.  EOF before the artifact's own end marker is [`ParseError::Truncated`].
pub fn parse_from(
    mut reader: impl Read,
    parser: &mut ArtifactParser,
    installer: &mut impl Installer,
) -> Result<()> {
    let mut buf = [0u8; 8 * BLOCK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Err(ParseError::Truncated),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        if let Status::Done = parser.feed(&buf[..n], installer)? {
            return Ok(());
        }
    }
}

/// Async version of [`parse_from`].
pub async fn parse_from_async(
    mut reader: impl AsyncRead + Unpin,
    parser: &mut ArtifactParser,
    installer: &mut impl Installer,
) -> Result<()> {
    let mut buf = [0u8; 8 * BLOCK_SIZE];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return Err(ParseError::Truncated),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        if let Status::Done = parser.feed(&buf[..n], installer)? {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullInstaller;

    impl Installer for NullInstaller {
        fn prepare(&mut self, _payload: &Payload) -> anyhow::Result<()> {
            Ok(())
        }

        fn write(
            &mut self,
            _payload: &Payload,
            _filename: &str,
            _total_size: u64,
            _offset: u64,
            _chunk: &[u8],
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn dispatch_patterns() {
        assert_eq!(classify("version"), FileClass::Version);
        assert_eq!(classify("header.tar/header-info"), FileClass::HeaderInfo);
        assert_eq!(
            classify("header.tar/headers/0000/meta-data"),
            FileClass::MetaData
        );
        assert_eq!(classify("data/0.tar"), FileClass::PayloadData);
        assert_eq!(classify("data/0.tar/0000.ext4"), FileClass::PayloadData);
        assert_eq!(classify("manifest"), FileClass::Drop);
        assert_eq!(classify("scripts/state.sh"), FileClass::Drop);
        assert_eq!(classify("header.tar"), FileClass::ArchiveOpen);
        assert_eq!(classify("stray.tar"), FileClass::ArchiveOpen);
    }

    #[test]
    fn meta_data_index_parsing() {
        assert_eq!(
            meta_data_index("header.tar/headers/0000/meta-data").unwrap(),
            0
        );
        assert_eq!(meta_data_index("header.tar/headers/17/meta-data").unwrap(), 17);
        assert!(meta_data_index("header.tar/headers/x/meta-data").is_err());
        assert!(meta_data_index("header.tar/headers/0/extra/meta-data").is_err());
    }

    #[test]
    fn payload_path_parsing() {
        assert_eq!(payload_path("data/0.tar").unwrap(), (0, None));
        assert_eq!(payload_path("data/0007.tar").unwrap(), (7, None));
        assert_eq!(
            payload_path("data/1.tar/rootfs.ext4").unwrap(),
            (1, Some("rootfs.ext4"))
        );
        assert!(payload_path("data/x.tar").is_err());
        assert!(payload_path("data/1.zip").is_err());
        assert!(payload_path("data/.tar").is_err());
    }

    #[test]
    fn lone_zero_block_is_fatal() {
        let mut parser = ArtifactParser::new();
        let mut stream = vec![0u8; BLOCK_SIZE];
        stream.extend_from_slice(&[b'x'; BLOCK_SIZE]);
        let err = parser.feed(&stream, &mut NullInstaller).unwrap_err();
        assert!(matches!(err, ParseError::LoneZeroBlock));
    }

    #[test]
    fn failed_context_is_poisoned() {
        let mut parser = ArtifactParser::new();
        let garbage = [0xffu8; 2 * BLOCK_SIZE];
        assert!(parser.feed(&garbage, &mut NullInstaller).is_err());
        assert!(matches!(
            parser.feed(&[], &mut NullInstaller),
            Err(ParseError::Poisoned)
        ));
    }

    #[test]
    fn empty_artifact_needs_version() {
        let mut parser = ArtifactParser::new();
        let err = parser
            .feed(&[0u8; 2 * BLOCK_SIZE], &mut NullInstaller)
            .unwrap_err();
        assert!(matches!(err, ParseError::MissingVersion));
    }
}
