//! Decoder for one 512-byte ustar header block.
//!
//! Field layout per POSIX 1003.1-1990; only the name, size and magic fields
//! are interpreted here.  The size field is a zero-padded ASCII octal number
//! terminated by NUL or space (e.g. `"00000001234\0"`); the magic field must
//! start with `ustar`.  A block whose first name byte is NUL signals end of
//! the current archive — the caller must see a second zero block before
//! treating it as a real end-of-archive marker.

use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

use crate::{
    error::{ParseError, Result},
    BLOCK_SIZE,
};

const MAGIC: &[u8; 5] = b"ustar";

/// On-wire header block.  All fields are ASCII; numeric fields are octal.
#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct HeaderBlock {
    pub name: [u8; 100],
    pub mode: [u8; 8],
    pub uid: [u8; 8],
    pub gid: [u8; 8],
    pub size: [u8; 12],
    pub mtime: [u8; 12],
    pub cksum: [u8; 8],
    pub typeflag: u8,
    pub linkname: [u8; 100],
    pub magic: [u8; 6],
    pub version: [u8; 2],
    pub uname: [u8; 32],
    pub gname: [u8; 32],
    pub devmajor: [u8; 8],
    pub devminor: [u8; 8],
    pub prefix: [u8; 155],
    pub pad: [u8; 12],
}

/// Name and declared content length of one archive entry, borrowed from the
/// block it was decoded from.  The name is not yet joined to the enclosing
/// archive chain.
#[derive(Debug, PartialEq)]
pub struct EntryHeader<'a> {
    pub name: &'a str,
    pub size: u64,
}

/// True when the block's first name byte is NUL (end-of-archive candidate).
pub fn is_zero_name(block: &[u8]) -> bool {
    block[0] == 0
}

/// Rounds a declared entry size up to the on-wire footprint: content is
/// always padded to the next block boundary.
pub fn padded_size(size: u64) -> u64 {
    (size + BLOCK_SIZE as u64 - 1) & !(BLOCK_SIZE as u64 - 1)
}

/// Decodes exactly one header block.  `block` must be [`BLOCK_SIZE`] bytes;
/// the caller has already ruled out the zero-name case.
pub fn decode(block: &[u8]) -> Result<EntryHeader<'_>> {
    let header = HeaderBlock::ref_from_bytes(&block[..BLOCK_SIZE])
        .expect("header block is exactly 512 unaligned bytes");

    if &header.magic[..MAGIC.len()] != MAGIC {
        return Err(ParseError::BadMagic);
    }

    let name_len = memchr::memchr(0, &header.name).unwrap_or(header.name.len());
    let name =
        std::str::from_utf8(&header.name[..name_len]).map_err(|_| ParseError::InvalidName)?;

    Ok(EntryHeader {
        name,
        size: parse_octal(&header.size)?,
    })
}

/// Parses a zero-padded ASCII octal field, terminated by NUL or space.
/// Leading spaces (written by some archivers) are skipped.
fn parse_octal(field: &[u8]) -> Result<u64> {
    let invalid = || ParseError::InvalidSize(String::from_utf8_lossy(field).into_owned());

    let start = field
        .iter()
        .position(|b| *b != b' ')
        .unwrap_or(field.len());
    let end = field[start..]
        .iter()
        .position(|b| *b == 0 || *b == b' ')
        .map_or(field.len(), |i| start + i);
    let digits = &field[start..end];
    if digits.is_empty() {
        return Err(invalid());
    }

    let mut value: u64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() || b > b'7' {
            return Err(invalid());
        }
        value = value
            .checked_mul(8)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
            .ok_or_else(invalid)?;
    }
    Ok(value)
}
