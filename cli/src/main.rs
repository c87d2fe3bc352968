// vim: tw=80
//! `pureflash`: a small operator CLI over `pureflash-core`, in the style of
//! the daemon's own `bfffsd/main.rs` (`clap` derive dispatch, a
//! `tracing_subscriber::fmt` subscriber installed in `main`).

use clap::{Parser, Subcommand};
use pureflash_core::{
    aof::Aof,
    conductor::{Conductor, HttpConductor},
    config::Config,
    types::LIBRARY_VERSION,
    volume::MemVolume,
};
use std::{
    io::{self, Read, Write},
    process::ExitCode,
    sync::Arc,
};
use tracing::error;

#[derive(Parser)]
#[command(name = "pureflash", about = "Operate PureFlash append-only files")]
struct Cli {
    /// Base URL of the conductor's control plane.
    #[arg(long, env = "PUREFLASH_CONDUCTOR_URL", default_value = "http://127.0.0.1:49180")]
    conductor_url: String,

    /// Size in bytes of the in-memory append buffer.
    #[arg(long, env = "PUREFLASH_APPEND_BUFFER", default_value_t = 4 * 1024 * 1024)]
    append_buffer_size: u64,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Create a new AoF through the conductor.
    Create {
        name: String,
        #[arg(long, default_value_t = pureflash_core::types::DEFAULT_VOLUME_SIZE)]
        size: u64,
        #[arg(long, default_value_t = 3)]
        replicas: u32,
    },
    /// Open an AoF and append stdin to it.
    Append { name: String },
    /// Read `len` bytes starting at `offset` and write them to stdout.
    Read { name: String, offset: u64, len: u64 },
}

impl Cli {
    fn config(&self) -> Config {
        Config::default()
            .with_conductor_url(self.conductor_url.clone())
            .with_append_buffer_size(self.append_buffer_size)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(%e, "pureflash command failed");
            eprintln!("pureflash: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> pureflash_core::Result<()> {
    let cfg = cli.config();
    match &cli.cmd {
        Cmd::Create { name, size, replicas } => {
            let conductor = HttpConductor::new(cfg.conductor_url.clone());
            let vol_id = conductor.create_aof(name, *size, *replicas)?;
            // A real deployment resolves `vol_id` to a network-backed Volume
            // through whatever transport the conductor names; this CLI has
            // no such transport (spec.md section 1), so it provisions a
            // local, process-lifetime stand-in purely to exercise the AoF
            // lifecycle end to end.
            let volume: Arc<dyn pureflash_core::volume::Volume> =
                Arc::new(MemVolume::new(vol_id, 0, name.clone(), *size));
            Aof::create_on(volume, cfg)?;
            println!("created AoF {name} (vol_id={vol_id})");
            Ok(())
        }
        Cmd::Append { name } => {
            let volume = local_volume(name);
            let aof = Aof::open(volume, cfg, LIBRARY_VERSION)?;
            let mut data = Vec::new();
            io::stdin()
                .read_to_end(&mut data)
                .map_err(pureflash_core::Error::from)?;
            aof.append(&data)?;
            aof.flush()?;
            Ok(())
        }
        Cmd::Read { name, offset, len } => {
            let volume = local_volume(name);
            let aof = Aof::open(volume, cfg, LIBRARY_VERSION)?;
            let mut out = vec![0u8; *len as usize];
            let n = aof.read(*offset, &mut out)?;
            io::stdout().write_all(&out[..n]).map_err(pureflash_core::Error::from)?;
            Ok(())
        }
    }
}

/// Stand-in for resolving an AoF's name to its backing `Volume` over the
/// network; see the comment in `Cmd::Create`.
fn local_volume(name: &str) -> Arc<dyn pureflash_core::volume::Volume> {
    Arc::new(MemVolume::new(0, 0, name.to_string(), pureflash_core::types::DEFAULT_VOLUME_SIZE))
}
