// vim: tw=80
//! C6: random reads.
//!
//! A request may span the sector-aligned boundary (`buf_base`) between data
//! that's only ever lived in the append buffer and data the volume already
//! has; this splits the request there; the in-memory side is a plain copy,
//! the volume side goes through sector realignment because the caller's
//! range need not start or end on a sector boundary the way a flush's
//! writes always do.
//!
//! Unlike a flush write failure, a read failure is not fatal: spec.md
//! section 7 has `read` return an error to its caller instead of aborting,
//! since nothing durable was at risk. Past-end-of-file is not a failure at
//! all: spec.md section 4.6 step 1 has the caller clamp the request to the
//! current file length and return however many bytes that leaves, down to
//! zero.

use super::Aof;
use crate::{
    error::Result,
    sync_bridge::{InflightSemaphore, SyncLatch},
    types::{round_down, segment_chunks, DevOffset, SECTOR_SIZE},
    volume::zeroed_buffer,
};

impl Aof {
    /// Read up to `out.len()` bytes starting at logical `offset`, clamped to
    /// the current end of the file, and return the number of bytes actually
    /// filled in at the front of `out` (spec.md section 4.6, step 1). A
    /// request entirely at or past the current file length returns `0`
    /// rather than erroring.
    #[tracing::instrument(skip(self, out), fields(offset, len = out.len()))]
    pub fn read(&self, offset: u64, out: &mut [u8]) -> Result<usize> {
        let (buf_base, mem_snapshot, data_start, total_len) = {
            let state = self.state.lock().unwrap();
            (
                state.buf_base,
                state.buf[..state.buf_fill].to_vec(),
                state.header.data_start(),
                state.buf_base + state.buf_fill as u64,
            )
        };

        if offset >= total_len {
            return Ok(0);
        }
        let len = (out.len() as u64).min(total_len - offset);
        if len == 0 {
            return Ok(0);
        }
        let out = &mut out[..len as usize];

        if offset + len > buf_base {
            let mem_start = offset.max(buf_base);
            let mem_out_off = (mem_start - offset) as usize;
            let mem_src_off = (mem_start - buf_base) as usize;
            let n = out.len() - mem_out_off;
            out[mem_out_off..].copy_from_slice(&mem_snapshot[mem_src_off..mem_src_off + n]);
        }

        if offset < buf_base {
            let vol_len = (len as usize).min((buf_base - offset) as usize);
            let aligned_start = round_down(offset, SECTOR_SIZE);
            let aligned_len = (buf_base - aligned_start) as usize;
            let scratch = self.scratch_read(data_start, aligned_start, aligned_len)?;
            let copy_off = (offset - aligned_start) as usize;
            out[..vol_len].copy_from_slice(&scratch[copy_off..copy_off + vol_len]);
        }

        Ok(len as usize)
    }

    /// Read `aligned_len` bytes starting at the sector-aligned `aligned_start`
    /// (relative to the data region, i.e. not yet offset by the header) from
    /// the volume, with a bounded in-flight window of `cfg.max_inflight`
    /// submissions split so that none crosses a 64 KiB device boundary
    /// (spec.md section 4.6 steps 3-6, testable properties 4 and 5).
    fn scratch_read(&self, data_start: DevOffset, aligned_start: u64, aligned_len: usize) -> Result<Vec<u8>> {
        let mut scratch = vec![0u8; aligned_len];
        let device_start = data_start + aligned_start as DevOffset;
        let chunks = segment_chunks(device_start, aligned_len as u64);

        let latch = SyncLatch::new(chunks.len());
        let sem = InflightSemaphore::new(self.cfg.max_inflight);
        let mut pending = Vec::with_capacity(chunks.len());
        for (device_offset, chunk_len) in chunks {
            let coff = (device_offset - device_start) as usize;
            let clen = chunk_len as usize;
            let dbs = zeroed_buffer(clen);

            sem.acquire();
            let completion = latch.completion();
            let permit = sem.clone();
            self.volume.submit_read(
                dbs.try_mut().unwrap(),
                device_offset,
                Box::new(move |status| {
                    completion(status);
                    permit.release();
                }),
            )?;
            pending.push((coff, clen, dbs));
        }
        latch.wait()?;
        for (coff, clen, dbs) in pending {
            scratch[coff..coff + clen].copy_from_slice(&dbs.try_const().unwrap());
        }
        Ok(scratch)
    }
}
