//! FIOS CLI
//!
//! File Input/Output over Serial: send or receive one file over a serial line.

mod config;
mod progress;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use console::style;
use fios_core::{Direction, Session, SessionBuilder, Status, TransferState};
use fios_transport::{SerialPort, Transport};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

use config::Config;
use progress::{TransferProgress, format_bytes, format_duration, format_speed};

const EXIT_OK: u8 = 0;
const EXIT_USAGE: u8 = 1;
const EXIT_TRANSPORT: u8 = 2;
const EXIT_SESSION: u8 = 3;
const EXIT_FAILED: u8 = 4;
const EXIT_INTERRUPTED: u8 = 5;

/// FIOS - reliable file transfer over a serial line
#[derive(Debug, Parser)]
#[command(name = "fios")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured baud rate
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// Override the poll interval in milliseconds
    #[arg(long, global = true)]
    interval: Option<u64>,

    /// Hide the progress bar
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Send a file to the peer
    #[command(visible_alias = "s")]
    Send {
        /// Serial device path, or "auto"
        #[arg(required = true)]
        device: String,

        /// File to send
        #[arg(required = true)]
        file: PathBuf,
    },

    /// Receive a file from the peer
    #[command(visible_alias = "r")]
    Receive {
        /// Serial device path, or "auto"
        #[arg(required = true)]
        device: String,

        /// Destination file (created or truncated)
        #[arg(required = true)]
        file: PathBuf,
    },

    /// Print the effective configuration
    Config {
        /// Also write it to the configuration file
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(if e.use_stderr() { EXIT_USAGE } else { EXIT_OK });
        }
    };

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            report_error(&format!("{e:#}"));
            return ExitCode::from(EXIT_USAGE);
        }
    };

    init_logging(cli.verbose, &config.logging.level);

    let code = match &cli.command {
        Commands::Send { device, file } => {
            transfer(Direction::Send, device, file, &config, cli.quiet).await
        }
        Commands::Receive { device, file } => {
            transfer(Direction::Receive, device, file, &config, cli.quiet).await
        }
        Commands::Config { write } => show_config(&config, *write, cli.config.as_deref()),
    };

    ExitCode::from(code)
}

/// Load the configuration file and apply command-line overrides
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    if let Some(baud) = cli.baud {
        config.serial.baud_rate = baud;
    }
    if let Some(interval) = cli.interval {
        config.transfer.poll_interval_ms = interval;
    }

    config.validate()?;
    Ok(config)
}

/// `--verbose` wins, then `RUST_LOG`, then the configured level
fn init_logging(verbose: bool, level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    // Logs go to stderr so the progress bar and result lines stay readable.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn report_error(message: &str) {
    eprintln!("{} {}", style("error:").red().bold(), message);
}

fn show_config(config: &Config, write: bool, path: Option<&Path>) -> u8 {
    let rendered = match toml::to_string_pretty(config) {
        Ok(rendered) => rendered,
        Err(e) => {
            report_error(&format!("cannot render configuration: {e}"));
            return EXIT_USAGE;
        }
    };
    print!("{rendered}");

    if write {
        let path = path.map_or_else(Config::default_path, Path::to_path_buf);
        if let Err(e) = config.save(&path) {
            report_error(&format!("cannot write {}: {e:#}", path.display()));
            return EXIT_USAGE;
        }
        eprintln!("{} {}", style("Wrote").green(), path.display());
    }

    EXIT_OK
}

/// How the poll loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// The session reached a terminal state on its own
    Finished,
    /// Ctrl-C
    Interrupted,
    /// Nothing changed for the configured stall timeout
    Stalled(Duration),
}

/// Run one transfer and map its result to an exit code
async fn transfer(
    direction: Direction,
    device: &str,
    file: &Path,
    config: &Config,
    quiet: bool,
) -> u8 {
    let device = config.device_for(device);
    let port = match SerialPort::open(&device, &config.serial_config()) {
        Ok(port) => port,
        Err(e) => {
            report_error(&e.to_string());
            return EXIT_TRANSPORT;
        }
    };

    let builder = SessionBuilder::new().config(config.session_config());
    let opened = match direction {
        Direction::Send => builder.send(port, file),
        Direction::Receive => builder.receive(port, file),
    };
    let mut session = match opened {
        Ok(session) => session,
        Err(e) => {
            report_error(&format!("cannot open session on {}: {e}", file.display()));
            return EXIT_SESSION;
        }
    };

    let name = file
        .file_name()
        .map_or_else(|| file.display().to_string(), |n| n.to_string_lossy().into_owned());
    let label = match direction {
        Direction::Send => format!("Sending {name} via {device}"),
        Direction::Receive => format!("Receiving {name} via {device}"),
    };
    tracing::info!("{}", label);

    let bar = (!quiet).then(|| TransferProgress::new(session.total_size().unwrap_or(0), &label));
    let outcome = drive(&mut session, config, bar.as_ref()).await;

    let code = match outcome {
        Outcome::Finished => match session.status() {
            Status::Completed => {
                if let Some(bar) = &bar {
                    bar.finish();
                }
                print_summary(direction, &name, &session);
                EXIT_OK
            }
            Status::Error(e) => {
                if let Some(bar) = &bar {
                    bar.abandon();
                }
                report_error(&format!("transfer failed: {e}"));
                EXIT_FAILED
            }
            Status::InProgress => EXIT_FAILED,
        },
        Outcome::Interrupted => {
            if let Some(bar) = &bar {
                bar.abandon();
            }
            report_error("interrupted");
            EXIT_INTERRUPTED
        }
        Outcome::Stalled(limit) => {
            if let Some(bar) = &bar {
                bar.abandon();
            }
            report_error(&format!("no progress for {}", format_duration(limit)));
            EXIT_INTERRUPTED
        }
    };

    session.close();
    code
}

fn print_summary<T: Transport>(direction: Direction, name: &str, session: &Session<T>) {
    let verb = match direction {
        Direction::Send => "Sent",
        Direction::Receive => "Received",
    };
    let transfer = session.transfer();

    let mut line = format!(
        "{} {} {} ({})",
        style("✓").green().bold(),
        verb,
        style(name).bold(),
        format_bytes(transfer.bytes_transferred())
    );
    if let Some(elapsed) = transfer.elapsed() {
        line.push_str(&format!(" in {}", format_duration(elapsed)));
    }
    if let Some(speed) = transfer.speed() {
        line.push_str(&format!(", {}", format_speed(speed)));
    }
    println!("{line}");
}

/// Poll the session on a fixed interval until it finishes, Ctrl-C arrives or
/// the watchdog fires
async fn drive<T: Transport>(
    session: &mut Session<T>,
    config: &Config,
    bar: Option<&TransferProgress>,
) -> Outcome {
    let mut ticker = tokio::time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut armed = true;

    let mut watchdog = StallWatchdog::new(config.stall_timeout(), Instant::now());

    loop {
        tokio::select! {
            result = &mut ctrl_c, if armed => match result {
                Ok(()) => {
                    tracing::warn!("Interrupted after {} bytes", session.bytes_transferred());
                    return Outcome::Interrupted;
                }
                Err(e) => {
                    tracing::warn!("Cannot listen for Ctrl-C: {}", e);
                    armed = false;
                }
            },
            _ = ticker.tick() => {
                let active = session.idle();

                if let Some(bar) = bar {
                    if let Some(total) = session.total_size() {
                        bar.set_total(total);
                    }
                    bar.update(session.bytes_transferred());
                }

                if !active {
                    return Outcome::Finished;
                }

                let marker = (session.bytes_transferred(), session.state());
                if let Some(limit) = watchdog.observe(marker, Instant::now()) {
                    tracing::warn!("No progress for {:?} in state {:?}", limit, marker.1);
                    return Outcome::Stalled(limit);
                }
            }
        }
    }
}

/// Fires when the (bytes, state) marker stops changing for too long
#[derive(Debug)]
struct StallWatchdog {
    limit: Option<Duration>,
    marker: (u64, TransferState),
    since: Instant,
}

impl StallWatchdog {
    fn new(limit: Option<Duration>, now: Instant) -> Self {
        Self {
            limit,
            marker: (0, TransferState::Idle),
            since: now,
        }
    }

    /// Record the latest marker; returns the limit once it has been exceeded
    fn observe(&mut self, marker: (u64, TransferState), now: Instant) -> Option<Duration> {
        let limit = self.limit?;

        if marker != self.marker {
            self.marker = marker;
            self.since = now;
            return None;
        }

        (now.duration_since(self.since) >= limit).then_some(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_send() {
        let cli = Cli::try_parse_from(["fios", "send", "/dev/ttyUSB0", "image.bin", "-b", "9600"])
            .unwrap();
        assert_eq!(cli.baud, Some(9600));
        match cli.command {
            Commands::Send { device, file } => {
                assert_eq!(device, "/dev/ttyUSB0");
                assert_eq!(file, PathBuf::from("image.bin"));
            }
            _ => panic!("expected send"),
        }
    }

    #[test]
    fn test_cli_aliases() {
        let cli = Cli::try_parse_from(["fios", "r", "auto", "out.bin", "--quiet"]).unwrap();
        assert!(cli.quiet);
        assert!(matches!(cli.command, Commands::Receive { .. }));

        let cli = Cli::try_parse_from(["fios", "-v", "s", "auto", "in.bin"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Send { .. }));
    }

    #[test]
    fn test_cli_usage_errors() {
        let err = Cli::try_parse_from(["fios", "send", "/dev/ttyUSB0"]).unwrap_err();
        assert!(err.use_stderr());

        let err = Cli::try_parse_from(["fios", "--help"]).unwrap_err();
        assert!(!err.use_stderr());
    }

    #[test]
    fn test_overrides_are_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        Config::default().save(&path).unwrap();
        let path = path.to_string_lossy().into_owned();

        let cli = Cli::try_parse_from(["fios", "-c", &path, "--interval", "5", "config"]).unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.transfer.poll_interval_ms, 5);

        let cli = Cli::try_parse_from(["fios", "-c", &path, "-b", "1234", "config"]).unwrap();
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let cli = Cli::try_parse_from(["fios", "-c", "/nonexistent/fios.toml", "config"]).unwrap();
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn test_watchdog_disabled() {
        let start = Instant::now();
        let mut watchdog = StallWatchdog::new(None, start);
        let later = start + Duration::from_secs(3600);
        assert_eq!(watchdog.observe((0, TransferState::Idle), later), None);
    }

    #[test]
    fn test_watchdog_fires_without_progress() {
        let start = Instant::now();
        let limit = Duration::from_secs(5);
        let mut watchdog = StallWatchdog::new(Some(limit), start);

        let marker = (0, TransferState::AwaitingPeerReady);
        assert_eq!(watchdog.observe(marker, start + Duration::from_secs(1)), None);
        assert_eq!(watchdog.observe(marker, start + Duration::from_secs(4)), None);
        assert_eq!(watchdog.observe(marker, start + Duration::from_secs(6)), Some(limit));
    }

    #[test]
    fn test_watchdog_resets_on_progress() {
        let start = Instant::now();
        let limit = Duration::from_secs(5);
        let mut watchdog = StallWatchdog::new(Some(limit), start);

        let t = |s| start + Duration::from_secs(s);
        assert_eq!(watchdog.observe((0, TransferState::Transferring), t(4)), None);
        assert_eq!(watchdog.observe((8192, TransferState::Transferring), t(8)), None);
        assert_eq!(watchdog.observe((8192, TransferState::Transferring), t(12)), None);
        assert_eq!(watchdog.observe((8192, TransferState::Transferring), t(13)), Some(limit));
    }

    #[tokio::test]
    async fn test_drive_finishes_over_memory_pipe() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        let dst = dir.path().join("dst.bin");
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&src, &data).unwrap();

        let (a, b) = fios_transport::MemoryPipe::pair();
        let mut sender = Session::send(a, &src).unwrap();
        let mut receiver = Session::receive(b, &dst).unwrap();

        let mut config = Config::default();
        config.transfer.poll_interval_ms = 1;

        // The receiver is driven by hand between sender ticks.
        let pump = async {
            while receiver.idle() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        };
        let (outcome, ()) = tokio::join!(drive(&mut sender, &config, None), pump);

        assert_eq!(outcome, Outcome::Finished);
        assert!(matches!(sender.status(), Status::Completed));
        assert!(matches!(receiver.status(), Status::Completed));
        assert_eq!(std::fs::read(&dst).unwrap(), data);
    }
}
