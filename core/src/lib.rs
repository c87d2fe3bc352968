// vim: tw=80
//! `pureflash-core`: the append-only file (AoF) client layer.
//!
//! This crate implements the durability layer PureFlash clients append
//! through — the 4 KiB header and buffered, segment-aligned flush path
//! ([`aof`]), the LMT snapshot/COW entry model ([`lmt`]), the single-threaded
//! cooperative event executor ([`executor`]), and the sync-IO bridge
//! ([`sync_bridge`]) that lets blocking callers ride on top of it. The
//! network transport, replica placement, and on-disk bitmap/WAL that a real
//! `Volume` would need are out of scope: [`volume::Volume`] is the seam, and
//! [`volume::MemVolume`] is the in-memory stand-in this crate's own tests use
//! in place of one.

pub mod aof;
pub mod conductor;
pub mod config;
pub mod error;
pub mod executor;
pub mod lmt;
pub mod sync_bridge;
pub mod types;
pub mod volume;

pub use aof::Aof;
pub use config::Config;
pub use error::{Error, Result};
