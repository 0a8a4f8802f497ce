//! edcore entrypoint.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use core_config::{Config, load_from};
use core_mark::Margins;
use core_state::EditorOptions;
use std::path::PathBuf;
use std::sync::Once;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "edcore", version, about = "Line store driver")]
struct Args {
    /// Optional configuration file path (overrides discovery of `edcore.toml`).
    #[arg(long = "config")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Line count, file mode and terminator census of a file.
    Info { path: PathBuf },
    /// Load a file and write it back out byte for byte.
    Copy { src: PathBuf, dst: PathBuf },
    /// Reflow a whole file between margins.
    Format {
        path: PathBuf,
        #[arg(long)]
        left: Option<usize>,
        #[arg(long)]
        right: Option<usize>,
        /// Write here instead of saving over `path`.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

struct AppStartup {
    log_guard: Option<WorkerGuard>,
}

impl AppStartup {
    fn new() -> Self {
        Self { log_guard: None }
    }

    fn configure_logging(&mut self, config: &Config) -> Result<()> {
        let log_dir = config.log_dir();
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("creating log directory {}", log_dir.display()))?;

        let file_appender = tracing_appender::rolling::never(&log_dir, "edcore.log");
        let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
        match tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(nb_writer)
            .try_init()
        {
            Ok(_) => {
                self.log_guard = Some(guard);
            }
            Err(_err) => {
                // Global tracing subscriber already installed; drop guard so writer shuts down.
            }
        }
        Ok(())
    }

    fn install_panic_hook() {
        static HOOK: Once = Once::new();
        HOOK.call_once(|| {
            let default_panic = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                tracing::error!(target: "runtime.panic", ?info, "panic");
                default_panic(info);
            }));
        });
    }
}

fn run(command: Command, config: &Config) -> Result<()> {
    let pool = config.pool_config();
    match command {
        Command::Info { path } => {
            let info = edcore::info(&path, pool)?;
            println!("{info}");
        }
        Command::Copy { src, dst } => {
            let written = edcore::copy(&src, &dst, pool)?;
            println!("{written} bytes written to {}", dst.display());
        }
        Command::Format {
            path,
            left,
            right,
            output,
        } => {
            let margins = Margins::new(
                left.unwrap_or(config.margins.left),
                right.unwrap_or(config.margins.right),
            )
            .context("margins")?;
            let options = EditorOptions {
                pool,
                margins,
                autosave_dir: config.autosave_dir.clone(),
            };
            let summary = edcore::format(&path, margins, output.as_deref(), options)?;
            println!(
                "{} lines reflowed into {}",
                summary.lines_before, summary.lines_after
            );
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_from(args.config.clone())?;
    let mut startup = AppStartup::new();
    startup.configure_logging(&config)?;
    AppStartup::install_panic_hook();
    info!(
        target: "runtime",
        config = ?config.path,
        command = ?args.command,
        "startup"
    );

    let result = run(args.command, &config);
    if let Err(err) = &result {
        error!(target: "runtime", error = %err, "command_failed");
    }
    info!(target: "runtime", ok = result.is_ok(), "shutdown");
    result
}
