//! Binary entrypoint for the Corpsewarden CLI.
//!
//! Commands:
//! - `init` - write a default `corpsewarden.toml`
//! - `check-config` - load, validate and summarize the configuration
//! - `start` - run the service against JSON-lines host events on stdin
//!
//! See the library crate docs for module-level details: `corpsewarden::`.
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use corpsewarden::backend::memory::MemoryBackend;
use corpsewarden::config::Config;
use corpsewarden::coordinator::memory::MemoryCoordinator;
use corpsewarden::host::Host;
use corpsewarden::metrics;
use corpsewarden::service::ProxyService;

#[derive(Parser)]
#[command(name = "corpsewarden")]
#[command(about = "Corpse and death message proxies for arena games")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "corpsewarden.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Validate the configuration and print the effective settings
    CheckConfig,
    /// Run the service, reading host events from stdin
    Start,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            init_logging(&None, cli.verbose);
            if !force && tokio::fs::try_exists(&cli.config).await.unwrap_or(false) {
                warn!(
                    "{} already exists; use --force to overwrite",
                    cli.config
                );
                return Ok(());
            }
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::CheckConfig => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            print_summary(&config);
        }
        Commands::Start => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            info!("Starting Corpsewarden v{}", env!("CARGO_PKG_VERSION"));
            run_host(config, &cli.config).await?;
        }
    }

    Ok(())
}

fn print_summary(config: &Config) {
    let corpse_ttl = config.corpse_ttl();
    println!("language:        {}", config.language);
    println!(
        "corpses:         {} (duration {}, rotation {})",
        on_off(config.corpse.enabled),
        describe_duration(corpse_ttl.as_secs()),
        config.orientation_mode().name()
    );
    println!(
        "death messages:  {} (duration {}, height +{})",
        on_off(config.death_message.enabled),
        describe_duration(config.death_message_ttl().as_secs()),
        config.death_message.height_offset
    );
    println!(
        "settle delay:    {}ms, state checks {}ms / {}ms",
        config.advanced.corpse_creation_delay_ms,
        config.advanced.game_state_check_delay_ms,
        config.advanced.safety_recheck_delay_ms
    );
    println!("debug:           {}", on_off(config.debug.enabled));
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}

fn describe_duration(secs: i64) -> String {
    if secs < 0 {
        "until arena ends".to_string()
    } else {
        format!("{}s", secs)
    }
}

async fn run_host(config: Config, config_path: &str) -> Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let coordinator = MemoryCoordinator::new();
    let service = Arc::new(ProxyService::new(
        config,
        Arc::clone(&backend),
        Arc::new(coordinator.clone()),
    ));
    let scheduler = Arc::clone(&service).start();
    let host = Host::new(scheduler.clone(), coordinator, config_path);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if let Some(reply) = host.handle_line(&line).await {
                            let mut out = serde_json::to_string(&reply)?;
                            out.push('\n');
                            stdout.write_all(out.as_bytes()).await?;
                            stdout.flush().await?;
                        }
                    }
                    None => {
                        info!("Host input closed");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    let released = scheduler.shutdown().await;
    let snapshot = metrics::snapshot();
    info!(
        "Shutdown complete: {} proxies released, {} sweeps, {} reconcile passes, {} entities still live",
        released,
        snapshot.sweeps_run,
        snapshot.reconcile_passes,
        backend.live_count()
    );
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    let config_level = config
        .as_ref()
        .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    // CLI verbosity overrides config
    let base_level = match verbosity {
        0 => config_level,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config.as_ref().and_then(|c| c.logging.file.clone());
    let file = log_file.and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });
    if let Some(f) = file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Mirror to the console only in the foreground; stdout carries host replies otherwise
        let is_tty = atty::is(atty::Stream::Stderr);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
