//! crosscast-send - Background daemon for scheduled posting
//!
//! Monitors the scheduled post queue and automatically delivers content
//! to the configured platforms at the scheduled time.

use clap::Parser;
use libcrosscast::logging::{self, LogFormat, LoggingConfig};
use libcrosscast::service::CrosscastService;
use libcrosscast::{Config, CrosscastError, Result};
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "crosscast-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled posting")]
#[command(long_about = "\
crosscast-send - Background daemon for scheduled posting

DESCRIPTION:
    crosscast-send is a long-running daemon that watches the Crosscast
    queue and delivers scheduled posts at the right time.

    Posts due within the timer horizon get a dedicated timer; a periodic
    sweep catches everything else, including work left over from a
    previous process. Rate limiting, retry, and backoff are handled per
    platform.

USAGE:
    # Run in foreground (logs to stderr)
    crosscast-send

    # Run with a custom sweep interval
    crosscast-send --poll-interval 30

    # Purge terminal records older than 30 days on startup
    crosscast-send --cleanup-after 30

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes current post)

CONFIGURATION:
    Configuration file: ~/.config/crosscast/config.toml
    Queue location:     ~/.local/share/crosscast/scheduled_posts.json
    Token files:        ~/.config/crosscast/tokens/<platform>.token

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Authentication error
    3 - Invalid input
")]
struct Cli {
    /// Sweep interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "How often to check for scheduled posts (default: 60)")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging (useful for debugging)")]
    verbose: bool,

    /// Run once and exit (for testing)
    #[arg(long, hide = true)]
    #[arg(help = "Process due posts once and exit (for testing)")]
    once: bool,

    /// Purge terminal records older than this many days on startup
    #[arg(long, value_name = "DAYS")]
    cleanup_after: Option<u32>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(secs) = cli.poll_interval {
        config.scheduler.check_interval = secs;
    }
    info!(
        poll_interval = config.scheduler.check_interval,
        "crosscast-send daemon starting"
    );

    let service = CrosscastService::from_config(config).await?;

    if let Some(days) = cli.cleanup_after {
        let removed = service.scheduler().cleanup_old_posts(days).await?;
        info!(removed, days, "purged old terminal records");
    }

    if cli.once {
        let executed = service.scheduler().check_scheduled_posts().await?;
        info!(executed, "processed due posts once, exiting");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    setup_signal_handlers(shutdown_tx)?;

    service.run_scheduler(shutdown_rx).await;

    info!("crosscast-send daemon stopped");
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) {
    if verbose {
        LoggingConfig::new(LogFormat::Text, "debug".to_string(), true).init();
    } else {
        logging::init_default();
    }
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(shutdown: watch::Sender<bool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| CrosscastError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    // Signals are handled on a plain thread; the watch channel carries the
    // request into the async side
    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, stopping gracefully...");
                    let _ = shutdown.send(true);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(())
}
