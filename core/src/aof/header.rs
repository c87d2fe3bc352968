// vim: tw=80
//! The AoF's 4 KiB on-disk header (spec.md sections 3, 6).
//!
//! Laid out by hand rather than through `serde`: it's a single
//! fixed-geometry sector, and its first three fields are a bit-exact wire
//! contract (magic at offset 0, version at offset 4, length at offset 8) that
//! any differently-versioned build must agree on byte-for-byte — a `serde`
//! derive would make that layout an implementation detail of whichever
//! `Serialize` impl happens to run, instead of a pinned format.

use crate::{
    error::{Error, Result},
    types::{DevOffset, AOF_MAGIC, AOF_VERSION, HEADER_SIZE, LIBRARY_VERSION},
};

const MAGIC_OFF: usize = 0;
const VERSION_OFF: usize = 4;
const LENGTH_OFF: usize = 8;
const HEADER_WIRE_LEN: usize = 16;

/// The durable state of an AoF: just the file length needed to reopen it and
/// resume appending at the right offset (spec.md section 3, "AoF header").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AofHeader {
    /// Number of bytes appended and durably flushed, not counting the
    /// header itself. Always a multiple of `SECTOR_SIZE` once a header has
    /// been written back after `create` (spec.md section 4.1, invariant:
    /// "the header's length is only ever updated after every byte up to it
    /// has been made durable").
    pub length: u64,
}

impl AofHeader {
    pub fn new() -> Self {
        AofHeader { length: 0 }
    }

    /// Serialize into a zeroed `HEADER_SIZE`-byte sector.
    pub fn to_sector(&self) -> Vec<u8> {
        let mut sector = vec![0u8; HEADER_SIZE as usize];
        sector[MAGIC_OFF..MAGIC_OFF + 4].copy_from_slice(&AOF_MAGIC.to_le_bytes());
        sector[VERSION_OFF..VERSION_OFF + 4].copy_from_slice(&AOF_VERSION.to_le_bytes());
        sector[LENGTH_OFF..LENGTH_OFF + 8].copy_from_slice(&self.length.to_le_bytes());
        sector
    }

    /// Parse a header sector, checking magic and that this build's protocol
    /// version can understand it (spec.md section 6, "library versioning").
    pub fn from_sector(sector: &[u8]) -> Result<Self> {
        if sector.len() < HEADER_WIRE_LEN {
            return Err(Error::Einval("header sector too short".to_string()));
        }
        let magic = u32::from_le_bytes(sector[MAGIC_OFF..MAGIC_OFF + 4].try_into().unwrap());
        if magic != AOF_MAGIC {
            return Err(Error::Einval(format!("bad AoF magic: {magic:#x}")));
        }
        let version =
            u32::from_le_bytes(sector[VERSION_OFF..VERSION_OFF + 4].try_into().unwrap());
        if version != AOF_VERSION {
            return Err(Error::Eproto { caller: LIBRARY_VERSION, library: version });
        }
        let length = u64::from_le_bytes(sector[LENGTH_OFF..LENGTH_OFF + 8].try_into().unwrap());
        Ok(AofHeader { length })
    }

    /// Device offset of the first byte of appended data: immediately after
    /// the reserved header sector.
    pub fn data_start(&self) -> DevOffset {
        HEADER_SIZE as DevOffset
    }
}

impl Default for AofHeader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_sector_bytes() {
        let h = AofHeader { length: 65536 };
        let sector = h.to_sector();
        assert_eq!(sector.len(), HEADER_SIZE as usize);
        let back = AofHeader::from_sector(&sector).unwrap();
        assert_eq!(h, back);
    }

    #[test]
    fn length_lands_at_offset_8() {
        let h = AofHeader { length: 10 };
        let sector = h.to_sector();
        assert_eq!(
            u64::from_le_bytes(sector[8..16].try_into().unwrap()),
            10,
            "spec.md section 3/6: file length must be an 8-byte field at offset 8"
        );
    }

    #[test]
    fn rejects_bad_magic() {
        let sector = vec![0u8; HEADER_SIZE as usize];
        let err = AofHeader::from_sector(&sector).unwrap_err();
        assert!(matches!(err, Error::Einval(_)));
    }

    #[test]
    fn rejects_unknown_version() {
        let h = AofHeader::new();
        let mut sector = h.to_sector();
        sector[VERSION_OFF..VERSION_OFF + 4].copy_from_slice(&9999u32.to_le_bytes());
        let err = AofHeader::from_sector(&sector).unwrap_err();
        assert!(matches!(err, Error::Eproto { .. }));
    }
}
