// Example runner: replays a set of PNG captures through the scanner until the transfer
// completes, then writes the recovered bytes to stdout.
//
//   dotbeam capture-0.png capture-1.png ...
//
// DOTBEAM_CONFIG may name a JSON file with decoder tuning overrides.
// RUST_LOG controls log verbosity (default: info).

use anyhow::{Context, Result, bail};
use dotbeam::{Capture, Config, DecoderConfig, DecoderSession, ScanEvent, ScanExit, Scanner};
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// How many times the capture set is replayed before giving up.
const MAX_PASSES: usize = 50;
const REPLAY_TICK: Duration = Duration::from_millis(10);

/// `RUST_LOG` when it parses, `info` otherwise.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .init();

    let paths: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    if paths.is_empty() {
        bail!("usage: dotbeam <capture.png>...");
    }

    let tuning = match std::env::var_os("DOTBEAM_CONFIG") {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", PathBuf::from(&path).display()))?;
            DecoderConfig::from_json(&json)?
        }
        None => DecoderConfig::default(),
    };
    let session = DecoderSession::new(Config::default(), tuning)?;
    let mut scanner = Scanner::new(session).with_period(REPLAY_TICK);

    let total = paths.len() * MAX_PASSES;
    let captures = futures::stream::iter(paths.into_iter().cycle().take(total)).map(|path| {
        image::open(&path).map(|image| Capture::from(image.to_rgba8()))
    });

    let (handle, stop) = Scanner::stop_signal();
    let (events, mut received) = mpsc::channel(16);
    let scan = tokio::spawn(async move { scanner.run(captures, events, stop).await });

    let mut bytes = None;
    loop {
        tokio::select! {
            event = received.recv() => match event {
                Some(ScanEvent::Progress(progress)) => {
                    tracing::debug!("progress {:.0}%", progress * 100.0);
                }
                Some(ScanEvent::Complete(data)) => bytes = Some(data),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                handle.stop();
            }
        }
    }

    match scan.await?? {
        ScanExit::Completed => {}
        ScanExit::Stopped => bail!("scan interrupted"),
        ScanExit::SourceEnded => bail!("captures exhausted before the transfer completed"),
    }
    let bytes = bytes.context("scan completed without delivering bytes")?;
    std::io::stdout().write_all(&bytes)?;
    Ok(())
}
