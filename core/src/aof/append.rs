// vim: tw=80
//! C5: append and flush.
//!
//! `Aof` has exactly one writer at a time (spec.md section 5, the same
//! caller-serialization contract [`crate::lmt`] documents); `append`/
//! `flush` hold the state mutex for their whole duration rather than just
//! while touching the buffer, which is safe here only because of that
//! single-writer rule — there is no second caller ever waiting on the lock
//! to make holding it across a blocking IO a throughput problem.

use super::Aof;
use crate::{
    sync_bridge::{InflightSemaphore, SyncLatch},
    types::{round_up, segment_chunks, SECTOR_SIZE},
};
use tracing::error;

impl Aof {
    /// Append `data` to the file. Flushes the buffer out as needed to make
    /// room; does not itself guarantee `data` is durable until a subsequent
    /// `flush` (or a later `append`'s internal flush) completes. Returns
    /// the logical offset at which `data` begins.
    #[tracing::instrument(skip(self, data), fields(len = data.len()))]
    pub fn append(&self, data: &[u8]) -> crate::error::Result<u64> {
        let mut written = 0usize;
        let mut start_offset = None;
        while written < data.len() {
            let mut state = self.state.lock().unwrap();
            let offset_now = state.buf_base + state.buf_fill as u64;
            if start_offset.is_none() {
                start_offset = Some(offset_now);
            }
            let capacity_left = state.buf.len() - state.buf_fill;
            if capacity_left == 0 {
                drop(state);
                self.flush()?;
                continue;
            }
            let n = capacity_left.min(data.len() - written);
            let fill = state.buf_fill;
            state.buf[fill..fill + n].copy_from_slice(&data[written..written + n]);
            state.buf_fill += n;
            written += n;
        }
        Ok(start_offset.unwrap_or_else(|| self.len()))
    }

    /// Force every byte appended so far out to the volume and update the
    /// header. A no-op if there is nothing buffered.
    ///
    /// Any write failure here is unrecoverable: the volume gives no way to
    /// tell which of a multi-segment flush's writes actually landed, so
    /// there is no safe partial-retry. Per spec.md sections 4.5 and 7, this
    /// path logs the failure and aborts the process rather than returning
    /// an `Error` the caller could mistake for something retryable.
    #[tracing::instrument(skip(self))]
    pub fn flush(&self) -> crate::error::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.buf_fill == 0 {
            return Ok(());
        }

        let aligned_len = round_up(state.buf_fill as u64, SECTOR_SIZE) as usize;
        if aligned_len > state.buf_fill {
            // Zero-pad the tail of the last sector rather than writing
            // whatever stale bytes a previous flush left in the buffer past
            // `buf_fill` (spec.md section 4.5, "Flush").
            let fill = state.buf_fill;
            state.buf[fill..aligned_len].fill(0);
        }

        let device_start = state.header.data_start() + state.buf_base as crate::types::DevOffset;
        let chunks = segment_chunks(device_start, aligned_len as u64);

        // Bounded in-flight window of `cfg.max_inflight` (spec.md sections
        // 4.5, 5, testable property 5): acquire a permit before each
        // submission, release it from that submission's completion.
        let latch = SyncLatch::new(chunks.len());
        let sem = InflightSemaphore::new(self.cfg.max_inflight);
        for (device_offset, chunk_len) in chunks {
            let buf_off = (device_offset - device_start) as usize;
            let chunk = state.buf[buf_off..buf_off + chunk_len as usize].to_vec();
            let dbs = divbuf::DivBufShared::from(chunk);

            sem.acquire();
            let completion = latch.completion();
            let permit = sem.clone();
            if let Err(e) = self.volume.submit_write(
                dbs.try_const().unwrap(),
                device_offset,
                Box::new(move |status| {
                    completion(status);
                    permit.release();
                }),
            ) {
                error!(?e, device_offset, "flush write rejected by volume");
                std::process::abort();
            }
        }
        if let Err(e) = latch.wait() {
            error!(?e, "flush write failed");
            std::process::abort();
        }

        let new_durable_len = state.buf_base + state.buf_fill as u64;
        state.header.length = new_durable_len;
        let header_sector = state.header.to_sector();
        let header_latch = SyncLatch::new(1);
        let header_dbs = divbuf::DivBufShared::from(header_sector);
        if let Err(e) = self
            .volume
            .submit_write(header_dbs.try_const().unwrap(), 0, header_latch.completion())
        {
            error!(?e, "header update rejected by volume");
            std::process::abort();
        }
        if let Err(e) = header_latch.wait() {
            error!(?e, "header update failed");
            std::process::abort();
        }

        let new_buf_base = crate::types::round_down(new_durable_len, SECTOR_SIZE);
        let carry = (new_durable_len - new_buf_base) as usize;
        let old_buf_base = state.buf_base;
        let shift = (new_buf_base - old_buf_base) as usize;
        state.buf.copy_within(shift..shift + carry, 0);
        state.buf_fill = carry;
        state.buf_base = new_buf_base;

        Ok(())
    }
}
