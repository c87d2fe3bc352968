// vim: tw=80
//! C4/C5/C6: the append-only file itself.
//!
//! `Aof` owns the 4 KiB header (`header`), the append/flush path (`append`),
//! and the random-read path (`read`). All three share one piece of state:
//! an in-memory buffer holding the sector that straddles the durable/
//! not-yet-durable boundary, so a partially-filled last sector never needs
//! a read-modify-write against the volume to keep appending into it.

pub mod append;
pub mod header;
pub mod read;

use crate::{
    config::Config,
    conductor::Conductor,
    error::{Error, Result},
    types::{round_down, VolId, SECTOR_SIZE},
    volume::Volume,
};
use header::AofHeader;
use std::sync::{Arc, Mutex};

/// In-memory state guarded by `Aof::state`. See the module docs: `buf` holds
/// the bytes from the sector-aligned `buf_base` up to the current logical
/// end of the file, which includes both the last durable (but possibly
/// partially-filled) sector and any bytes appended since the last flush.
pub(crate) struct AofState {
    pub(crate) header:   AofHeader,
    pub(crate) buf:      Vec<u8>,
    pub(crate) buf_fill: usize,
    pub(crate) buf_base: u64,
}

/// A single-writer, append-only file layered over a [`Volume`].
pub struct Aof {
    pub(crate) volume: Arc<dyn Volume>,
    pub(crate) cfg:    Config,
    /// The backing volume's id, fixed for the lifetime of this `Aof`. Not
    /// part of the on-disk header (spec.md section 3 defines only magic,
    /// version, and length there) — callers get it from the `Volume` itself.
    vol_id:             VolId,
    pub(crate) state:  Mutex<AofState>,
}

impl Aof {
    /// Ask the conductor for a new backing volume and write a fresh header
    /// to it. Fails with [`Error::Eexist`] if a volume by this name is
    /// already known to the conductor (spec.md section 6).
    pub fn create(
        conductor: &dyn Conductor,
        volume_factory: impl FnOnce(VolId) -> Arc<dyn Volume>,
        cfg: Config,
        name: &str,
    ) -> Result<Self> {
        if conductor.check_volume_exists(name)? {
            return Err(Error::Eexist);
        }
        let vol_id = conductor.create_aof(name, cfg.default_volume_size, cfg.replica_count)?;
        let volume = volume_factory(vol_id);
        Self::init_on(volume, cfg, vol_id)
    }

    /// Write a fresh zero-length header directly onto an already-provisioned
    /// volume, bypassing the conductor. Used by tests and by callers that
    /// manage volume provisioning themselves.
    pub fn create_on(volume: Arc<dyn Volume>, cfg: Config) -> Result<Self> {
        let vol_id = volume.id();
        Self::init_on(volume, cfg, vol_id)
    }

    fn init_on(volume: Arc<dyn Volume>, cfg: Config, vol_id: VolId) -> Result<Self> {
        let header = AofHeader::new();
        let aof = Aof {
            volume,
            cfg: cfg.clone(),
            vol_id,
            state: Mutex::new(AofState {
                header,
                buf: vec![0u8; cfg.append_buffer_size as usize],
                buf_fill: 0,
                buf_base: 0,
            }),
        };
        aof.write_header(&header)?;
        Ok(aof)
    }

    /// Open an existing AoF, checking the caller's protocol version against
    /// this build's (spec.md section 6) and restoring the partially-filled
    /// last sector into the append buffer so appending can resume exactly
    /// where it left off.
    pub fn open(volume: Arc<dyn Volume>, cfg: Config, caller_version: u32) -> Result<Self> {
        if caller_version != crate::types::LIBRARY_VERSION {
            return Err(Error::Eproto { caller: caller_version, library: crate::types::LIBRARY_VERSION });
        }
        let header_sector = Self::blocking_read_sector(&*volume, 0)?;
        let header = AofHeader::from_sector(&header_sector)?;
        let vol_id = volume.id();

        let buf_base = round_down(header.length, SECTOR_SIZE);
        let partial_len = (header.length - buf_base) as usize;
        let mut buf = vec![0u8; cfg.append_buffer_size as usize];
        if partial_len > 0 {
            let sector = Self::blocking_read_sector(
                &*volume,
                header.data_start() + buf_base as i64,
            )?;
            buf[..SECTOR_SIZE as usize].copy_from_slice(&sector);
        }

        Ok(Aof {
            volume,
            cfg,
            vol_id,
            state: Mutex::new(AofState {
                header,
                buf,
                buf_fill: partial_len,
                buf_base,
            }),
        })
    }

    /// Volume id this AoF is backed by.
    pub fn vol_id(&self) -> VolId {
        self.vol_id
    }

    /// Logical length of the file: bytes durably appended so far, plus any
    /// still sitting in the append buffer unflushed.
    pub fn len(&self) -> u64 {
        let s = self.state.lock().unwrap();
        s.buf_base + s.buf_fill as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write_header(&self, header: &AofHeader) -> Result<()> {
        let latch = crate::sync_bridge::SyncLatch::new(1);
        let dbs = divbuf::DivBufShared::from(header.to_sector());
        self.volume
            .submit_write(dbs.try_const().unwrap(), 0, latch.completion())?;
        latch.wait()
    }

    /// Blocking single-sector read, used only during `open` before any
    /// executor or append-buffer state exists.
    fn blocking_read_sector(volume: &dyn Volume, offset: crate::types::DevOffset) -> Result<Vec<u8>> {
        let latch = crate::sync_bridge::SyncLatch::new(1);
        let dbs = crate::volume::zeroed_buffer(SECTOR_SIZE as usize);
        volume.submit_read(dbs.try_mut().unwrap(), offset, latch.completion())?;
        latch.wait()?;
        Ok(dbs.try_const().unwrap().to_vec())
    }
}
