// vim: tw=80
//! Error taxonomy for the AoF client layer.
//!
//! Modeled after the errno-flavored style the rest of the stack uses
//! (`Error::ENOTTY`, `Error::EINTEGRITY` in the DDML/vdev layers): variants
//! are named for the POSIX condition they stand in for, rather than for the
//! Rust-level cause, so callers across the FFI-ish boundary with the
//! conductor and the Volume layer can reason about them uniformly.

use std::io;

/// Errors produced by the LMT model, the event executor, the sync-IO
/// bridge, and the AoF lifecycle/append/read paths.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed input: bad AoF header magic/version, a misaligned request,
    /// or any other structurally invalid argument.
    #[error("invalid argument: {0}")]
    Einval(String),

    /// An accepted IO failed, or the underlying Volume could not be reached.
    #[error("I/O error: {0}")]
    Eio(String),

    /// Buffer or control-structure allocation failed.
    #[error("out of memory")]
    Enomem,

    /// The named volume does not exist and `O_CREAT` was not given.
    #[error("no such volume")]
    Enoent,

    /// `op=create_aof` was attempted against a volume that already exists.
    #[error("volume already exists")]
    Eexist,

    /// The caller's library version does not match this build's protocol
    /// version (spec.md section 6, "Library versioning").
    #[error("protocol version mismatch: caller={caller:#x} library={library:#x}")]
    Eproto { caller: u32, library: u32 },

    /// The conductor replied with a non-zero `ret_code`.
    #[error("conductor error {ret_code}: {reason}")]
    Econductor { ret_code: i32, reason: String },

    /// `Volume::submit` rejected the request before accepting it.
    #[error("submission failed: {0}")]
    Submit(i32),

    /// Catch-all for lower-level failures that don't map onto the above.
    #[error("{0}")]
    Other(String),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => Error::Enoent,
            io::ErrorKind::AlreadyExists => Error::Eexist,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
                Error::Einval(e.to_string())
            }
            io::ErrorKind::OutOfMemory => Error::Enomem,
            _ => Error::Eio(e.to_string()),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Eio(e.to_string())
    }
}

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
