// vim: tw=80
//! Explicit configuration, threaded through instead of kept as global mutable
//! state.
//!
//! The original kept a process-wide `default_cfg_file` that every AoF
//! implicitly consulted (spec.md section 9, Open Question). This crate
//! replaces it with a `Config` value the caller builds once and passes to
//! [`crate::aof::Aof::create`]/[`crate::aof::Aof::open`] and
//! [`crate::executor::Executor::new`] explicitly, the same way `bfffs-core`'s
//! `Pool`/`Database` take an explicit config rather than reading one from a
//! well-known path.

use crate::types::{DEFAULT_VOLUME_SIZE, MAX_INFLIGHT};

/// Which queue implementation an [`crate::executor::Executor`] should use.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueueKind {
    /// `Mutex`/`Condvar`-backed ring, for an executor thread that's allowed
    /// to block when idle (spec.md section 4.2, "blocking mode").
    Blocking,
    /// `crossbeam_queue::ArrayQueue`-backed ring, for an executor thread
    /// that polls continuously (spec.md section 4.2, "polling mode").
    Polling,
}

/// Runtime configuration for the AoF client layer.
#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the conductor's HTTP control plane.
    pub conductor_url: String,

    /// Size to request when creating a volume with no explicit size given.
    pub default_volume_size: u64,

    /// Number of replicas the conductor should place for a new volume.
    pub replica_count: u32,

    /// Size in bytes of the AoF's in-memory append buffer, `B` in spec.md
    /// section 4. Must be a multiple of
    /// [`crate::types::SECTOR_SIZE`].
    pub append_buffer_size: u64,

    /// Maximum number of writeback/readback IOs an `Aof` may have
    /// outstanding at once (spec.md sections 4.5, 4.6).
    pub max_inflight: usize,

    /// Depth of the executor's event queue (spec.md section 4.2).
    pub queue_depth: usize,

    /// Which queue backend the executor should use.
    pub queue_kind: QueueKind,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            conductor_url: "http://127.0.0.1:49180".to_string(),
            default_volume_size: DEFAULT_VOLUME_SIZE,
            replica_count: 3,
            append_buffer_size: 4 * 1024 * 1024,
            max_inflight: MAX_INFLIGHT,
            queue_depth: 1024,
            queue_kind: QueueKind::Blocking,
        }
    }
}

impl Config {
    /// Builder-style setter; used by the CLI when translating parsed
    /// arguments into a `Config`.
    pub fn with_conductor_url(mut self, url: impl Into<String>) -> Self {
        self.conductor_url = url.into();
        self
    }

    pub fn with_default_volume_size(mut self, size: u64) -> Self {
        self.default_volume_size = size;
        self
    }

    pub fn with_replica_count(mut self, n: u32) -> Self {
        self.replica_count = n;
        self
    }

    pub fn with_append_buffer_size(mut self, size: u64) -> Self {
        self.append_buffer_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_self_consistent() {
        let cfg = Config::default();
        assert_eq!(cfg.max_inflight, MAX_INFLIGHT);
        assert_eq!(cfg.append_buffer_size % crate::types::SECTOR_SIZE, 0);
    }

    #[test]
    fn builder_overrides_fields() {
        let cfg = Config::default()
            .with_conductor_url("http://conductor.example:9000")
            .with_replica_count(1);
        assert_eq!(cfg.conductor_url, "http://conductor.example:9000");
        assert_eq!(cfg.replica_count, 1);
    }
}
