//! lockerfs CLI
//!
//! - `mount`: serve the locker filesystem at a mountpoint (needs the `fuse` feature)
//! - `check`: validate a configuration and list the synthetic files it yields
//! - `resolve`: ask the configured naming service about one locker

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use env_logger::Env;
use lockerfs::diagnostics::LogSink;
use lockerfs::{
    Identity, MountCache, Resolver, Settings, Unresolved, DEFAULT_CONFIG_PATH, DEFAULT_WORKERS,
};

#[derive(Parser)]
#[command(name = "lockerfs")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Per-user automounter filesystem for network lockers")]
#[command(long_about = "lockerfs - per-user locker automounter\n\n\
    Mounts a directory in which every name is a symbolic link to the network\n\
    locker of that name, looked up on first access and remembered per user.\n\
    Users may create and remove their own links with ln -s and rm.\n\n\
    Examples:\n\
      lockerfs mount /mit\n\
      lockerfs check -c /etc/lockerfs/config.toml\n\
      lockerfs resolve sipb")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Mount the locker filesystem and serve it until interrupted
    Mount {
        /// Directory to mount on
        #[arg(value_name = "MOUNTPOINT")]
        mountpoint: PathBuf,

        /// Configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, value_name = "FILE")]
        config: PathBuf,

        /// Override the negative cache window from the configuration
        #[arg(long, value_name = "MS")]
        negative_ttl_ms: Option<u64>,

        /// Only the mounting user (and root) may see the mount
        #[arg(long)]
        no_allow_other: bool,

        /// Volume name shown by the Finder (macOS)
        #[arg(long, value_name = "NAME")]
        volname: Option<String>,

        /// Threads serving lookups (0 serves them on the session thread)
        #[arg(long, default_value_t = DEFAULT_WORKERS, value_name = "N")]
        workers: usize,
    },

    /// Validate the configuration and list the synthetic files
    Check {
        /// Configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, value_name = "FILE")]
        config: PathBuf,

        /// Mountpoint used when rendering the readme
        #[arg(short, long, default_value = "/mnt", value_name = "DIR")]
        mountpoint: PathBuf,
    },

    /// Resolve one locker name through the configured naming service
    Resolve {
        /// Locker name
        #[arg(value_name = "NAME")]
        name: String,

        /// Configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, value_name = "FILE")]
        config: PathBuf,
    },
}

type CliResult<T> = Result<T, Box<dyn Error>>;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run() -> CliResult<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Mount {
            mountpoint,
            config,
            negative_ttl_ms,
            no_allow_other,
            volname,
            workers,
        } => {
            let mut settings = Settings::load(&config)?;
            if let Some(ms) = negative_ttl_ms {
                settings.negative_ttl = Duration::from_millis(ms);
            }
            let options = lockerfs::MountOptions {
                allow_other: !no_allow_other,
                volname,
                workers,
                ..Default::default()
            };
            mount(&settings, &mountpoint, options)?;
            Ok(0)
        }

        Commands::Check { config, mountpoint } => {
            let settings = Settings::load(&config)?;
            let naming = settings.naming_service()?;
            let engine = settings.engine_builder(naming, &mountpoint)?.build()?;

            println!("config: {}", config.display());
            println!("naming: {}", settings.naming.kind);
            println!("negative ttl: {} ms", settings.negative_ttl.as_millis());
            for name in engine.synthetic().list() {
                let size = engine.synthetic().read(name).map_or(0, |b| b.len());
                println!("  {:<23} {:>6} bytes", name, size);
            }
            Ok(0)
        }

        Commands::Resolve { name, config } => {
            let settings = Settings::load(&config)?;
            let resolver = Resolver::new(
                Arc::new(MountCache::new()),
                settings.naming_service()?,
                Arc::new(LogSink),
                settings.policy,
            );

            let uid = Identity::current().uid;
            match resolver.resolve_detailed(uid, &name) {
                Ok((target, _)) => {
                    println!("{}", target);
                    Ok(0)
                }
                Err(reason) => {
                    let why = match reason {
                        Unresolved::NotFound => "unknown locker",
                        Unresolved::Unavailable => "naming service unavailable",
                        Unresolved::Failed => "lookup failed",
                        Unresolved::Exhausted => "no candidate could be attached",
                    };
                    eprintln!("{}: {}", name, why);
                    Ok(1)
                }
            }
        }
    }
}

#[cfg(feature = "fuse")]
fn mount(settings: &Settings, mountpoint: &Path, options: lockerfs::MountOptions) -> CliResult<()> {
    use lockerfs::signal::{install_signal_handlers, ShutdownSignal, DEFAULT_POLL};
    use lockerfs::LockerFs;

    let naming = settings.naming_service()?;
    let engine = settings.engine_builder(naming, mountpoint)?.build()?;

    let shutdown = Arc::new(ShutdownSignal::new());
    install_signal_handlers(shutdown.clone())?;

    let session = lockerfs::spawn_mount(LockerFs::new(Arc::new(engine)), mountpoint, options)?;
    shutdown.wait(DEFAULT_POLL);
    log::info!("{} received, unmounting {}", shutdown.signal_name(), mountpoint.display());
    drop(session);
    Ok(())
}

#[cfg(not(feature = "fuse"))]
fn mount(_settings: &Settings, _mountpoint: &Path, _options: lockerfs::MountOptions) -> CliResult<()> {
    Err("this build of lockerfs has no FUSE support (rebuild with --features fuse)".into())
}
