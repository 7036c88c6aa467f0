//! A compact on-disk format for [`WasmModule`] descriptions.
//!
//! The layout is a 16 byte header (`RWAS`, a two byte version, zero padding) followed by the
//! [postcard](https://docs.rs/postcard) encoding of the module.

use crate::{WasmModule, log};
use alloc::vec::Vec;
use core::fmt::{Display, Formatter};

const ARCHIVE_MAGIC_PREFIX: &[u8; 4] = b"RWAS";
const ARCHIVE_VERSION: &[u8; 2] = b"01";
#[rustfmt::skip]
const ARCHIVE_MAGIC: [u8; 16] = [ARCHIVE_MAGIC_PREFIX[0], ARCHIVE_MAGIC_PREFIX[1], ARCHIVE_MAGIC_PREFIX[2], ARCHIVE_MAGIC_PREFIX[3], ARCHIVE_VERSION[0], ARCHIVE_VERSION[1], 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

fn validate_magic(bytes: &[u8]) -> Result<usize, ArchiveError> {
    if bytes.len() < ARCHIVE_MAGIC.len() || &bytes[..ARCHIVE_MAGIC_PREFIX.len()] != ARCHIVE_MAGIC_PREFIX {
        return Err(ArchiveError::InvalidMagic);
    }
    if &bytes[ARCHIVE_MAGIC_PREFIX.len()..ARCHIVE_MAGIC_PREFIX.len() + ARCHIVE_VERSION.len()] != ARCHIVE_VERSION {
        return Err(ArchiveError::InvalidVersion);
    }
    if bytes[ARCHIVE_MAGIC_PREFIX.len() + ARCHIVE_VERSION.len()..ARCHIVE_MAGIC.len()] != [0; 10] {
        return Err(ArchiveError::InvalidPadding);
    }

    Ok(ARCHIVE_MAGIC.len())
}

/// Errors that can occur when reading an archived module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveError {
    /// The header does not start with `RWAS`.
    InvalidMagic,
    /// The archive was written by an incompatible version.
    InvalidVersion,
    /// The header padding is not zeroed.
    InvalidPadding,
    /// The payload could not be decoded.
    InvalidArchive,
}

impl Display for ArchiveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidMagic => write!(f, "invalid archive: invalid magic number"),
            Self::InvalidVersion => write!(f, "invalid archive: invalid version"),
            Self::InvalidPadding => write!(f, "invalid archive: invalid padding"),
            Self::InvalidArchive => write!(f, "invalid archive: invalid payload"),
        }
    }
}

impl core::error::Error for ArchiveError {}

impl WasmModule {
    /// Read a module description from archived bytes.
    pub fn from_archive(bytes: &[u8]) -> Result<WasmModule, ArchiveError> {
        let len = validate_magic(bytes)?;
        postcard::from_bytes(&bytes[len..]).map_err(|_e| {
            log::error!("failed to decode archived module: {_e}");
            ArchiveError::InvalidArchive
        })
    }

    /// Serialize the module description into archived bytes.
    pub fn serialize_archive(&self) -> Result<Vec<u8>, ArchiveError> {
        let mut out = Vec::from(ARCHIVE_MAGIC);
        let payload = postcard::to_allocvec(self).map_err(|_| ArchiveError::InvalidArchive)?;
        log::debug!("archived module: {} bytes", payload.len());
        out.extend_from_slice(&payload);
        Ok(out)
    }
}
