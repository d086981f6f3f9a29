//! dvgrab-session - DV tape capture from the terminal
//!
//! Reads the same settings file as the GUI front-end, runs one capture and
//! streams dvgrab's output until it exits or Ctrl-C stops it.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dvgrab_session::config::Settings;
use dvgrab_session::dvgrab::{resolve_tool, shell_join, tool_exists};
use dvgrab_session::recorder::{preview_command, LogLine, SessionCoordinator, StopDelivery};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Fallback poll interval while waiting for output
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long to wait for helper tasks after dvgrab exits
const RELEASE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "dvgrab-session")]
#[command(about = "Capture DV tapes with dvgrab into numbered folders")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file path
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a capture
    Capture(Overrides),

    /// Print the command a capture would run
    Preview(Overrides),

    /// Check that dvgrab can be found
    Check,

    /// Write the effective settings back to the settings file
    SaveSettings(Overrides),
}

#[derive(Args)]
struct Overrides {
    /// Base output directory
    #[arg(short, long)]
    output: Option<String>,

    /// Subfolder prefix
    #[arg(short, long)]
    prefix: Option<String>,
}

impl Overrides {
    fn apply(self, settings: &mut Settings) {
        if let Some(output) = self.output {
            settings.config.output_dir = output;
        }
        if let Some(prefix) = self.prefix {
            settings.config.subfolder_prefix = prefix;
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let directive = if cli.verbose {
        "dvgrab_session=debug"
    } else {
        "dvgrab_session=info"
    };
    dvgrab_session::init_tracing(directive);

    let settings_path = cli.settings.unwrap_or_else(Settings::default_path);
    let mut settings = Settings::load(&settings_path);

    match cli.command {
        Commands::Capture(overrides) => {
            overrides.apply(&mut settings);
            cmd_capture(settings, &settings_path).await
        }
        Commands::Preview(overrides) => {
            overrides.apply(&mut settings);
            cmd_preview(&settings)
        }
        Commands::Check => cmd_check(&settings),
        Commands::SaveSettings(overrides) => {
            overrides.apply(&mut settings);
            settings
                .save(&settings_path)
                .with_context(|| format!("Failed to save settings to {:?}", settings_path))?;
            println!("Saved settings to {}", settings_path.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn cmd_capture(mut settings: Settings, settings_path: &Path) -> Result<ExitCode> {
    if !tool_exists(settings.config.tool()) {
        warn!(
            "{} not found in PATH; install dvgrab or set dvgrab_path",
            settings.config.tool()
        );
    }

    let mut interrupts = listen_for_interrupts()?;
    let mut coordinator = SessionCoordinator::new();
    let feed = coordinator.feed();

    let started = coordinator.start(&settings.config, &mut settings.next_index_by_dir);
    print_lines(feed.drain());
    let session = started.context("Failed to start capture")?;

    // Persist the consumed index right away, a crash must not reuse it
    if let Err(e) = settings.save(settings_path) {
        warn!("Failed to save settings: {}", e);
    }
    info!("Capturing into {:?}", session.target_dir);

    let mut interrupted = false;
    loop {
        print_lines(feed.drain());
        if !coordinator.status().is_active() {
            break;
        }

        tokio::select! {
            _ = feed.notified() => {}
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            Some(()) = interrupts.recv() => {
                if interrupted {
                    warn!("Second interrupt, leaving dvgrab to finish on its own");
                    break;
                }
                interrupted = true;
                if coordinator.stop() == StopDelivery::Undeliverable {
                    warn!("Could not deliver stop signal to dvgrab");
                }
            }
        }
    }

    if !coordinator.release(RELEASE_TIMEOUT).await {
        warn!("dvgrab may still be running in the background");
    }
    print_lines(feed.drain());
    let outcome = coordinator.status().outcome;

    let code = outcome.map(|outcome| outcome.exit_code()).unwrap_or(1);
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}

/// Ctrl-C presses, queued while the capture loop is busy printing
fn listen_for_interrupts() -> Result<mpsc::UnboundedReceiver<()>> {
    let (tx, rx) = mpsc::unbounded_channel();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to listen for Ctrl-C")?;
        tokio::spawn(async move {
            while sigint.recv().await.is_some() {
                if tx.send(()).is_err() {
                    break;
                }
            }
        });
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });

    Ok(rx)
}

fn cmd_preview(settings: &Settings) -> Result<ExitCode> {
    let argv = preview_command(&settings.config, &settings.next_index_by_dir)
        .context("Failed to build preview")?;
    println!("{}", shell_join(&argv));
    Ok(ExitCode::SUCCESS)
}

fn cmd_check(settings: &Settings) -> Result<ExitCode> {
    let tool = settings.config.tool();
    match resolve_tool(tool) {
        Some(path) => {
            println!("dvgrab: {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("dvgrab: {} not found. Install it with: sudo apt install dvgrab", tool);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_lines(lines: Vec<LogLine>) {
    for line in lines {
        if line.is_error {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use nix::sys::signal::{raise, Signal};

    #[tokio::test]
    async fn test_interrupts_queue_until_read() {
        let mut interrupts = listen_for_interrupts().unwrap();

        // Both arrive while nobody is waiting on the receiver
        raise(Signal::SIGINT).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        raise(Signal::SIGINT).unwrap();

        for _ in 0..2 {
            let received = tokio::time::timeout(Duration::from_secs(5), interrupts.recv())
                .await
                .expect("interrupt lost");
            assert_eq!(received, Some(()));
        }
    }
}
