// THEORY:
// The `scanner` is the asynchronous driver around a `DecoderSession`. It owns nothing
// the session doesn't already own except the schedule: a fixed-period tick, a stop
// signal and the capture source.
//
// Key architectural principles:
// 1.  **Caller-owned source**: captures arrive as a `futures::Stream`. Camera glue,
//     a directory of PNGs or a test vector all look the same to the scanner.
// 2.  **Fixed cadence**: one capture is pulled and decoded per interval tick. Missed
//     ticks are skipped, never bunched up, so a slow tick cannot snowball.
// 3.  **Cooperative stop**: the stop signal is observed between ticks. A tick already
//     running completes; the next one never starts. The capture stream is dropped when
//     the scan returns, which is what releases the device.
// 4.  **Events, not callbacks**: progress and the final bytes travel over an mpsc
//     channel. A dropped receiver is treated like a stop request.

use crate::error::ScanError;
use crate::pipeline::DecoderSession;
use futures::{Stream, StreamExt};
use image::RgbaImage;
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// One owned RGBA capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Capture {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }
}

impl From<RgbaImage> for Capture {
    fn from(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// Progress after a decoded tick, in [0, 1].
    Progress(f64),
    /// Every frame has been received; the transfer bytes, zero padding included.
    Complete(Vec<u8>),
}

/// Why a scan returned without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanExit {
    Completed,
    Stopped,
    /// The capture stream ended before the transfer completed.
    SourceEnded,
}

/// Stops a running scan. Dropping the handle stops it as well.
#[derive(Debug)]
pub struct ScanHandle {
    stop: watch::Sender<bool>,
}

impl ScanHandle {
    pub fn stop(&self) {
        // An error only means the scan has already returned.
        let _ = self.stop.send(true);
    }
}

pub struct Scanner {
    session: DecoderSession,
    period: Duration,
}

impl Scanner {
    pub fn new(session: DecoderSession) -> Self {
        Self {
            session,
            period: DEFAULT_TICK,
        }
    }

    #[must_use]
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn session(&self) -> &DecoderSession {
        &self.session
    }

    /// Creates the stop handle and the receiver `run` listens on.
    pub fn stop_signal() -> (ScanHandle, watch::Receiver<bool>) {
        let (stop, receiver) = watch::channel(false);
        (ScanHandle { stop }, receiver)
    }

    /// Scans until the transfer completes, the stop signal fires or the source ends.
    /// A source error is the only hard failure. The session is reset after completion.
    pub async fn run<S, E>(
        &mut self,
        captures: S,
        events: mpsc::Sender<ScanEvent>,
        mut stop: watch::Receiver<bool>,
    ) -> Result<ScanExit, ScanError>
    where
        S: Stream<Item = Result<Capture, E>>,
        E: Display,
    {
        let mut captures = std::pin::pin!(captures);
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!("scan started ({} ms tick)", self.period.as_millis());

        loop {
            if *stop.borrow() {
                tracing::info!("scan stopped");
                return Ok(ScanExit::Stopped);
            }
            tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        tracing::info!("scan stopped");
                        return Ok(ScanExit::Stopped);
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let capture = match captures.next().await {
                Some(Ok(capture)) => capture,
                Some(Err(e)) => {
                    tracing::warn!("capture source failed: {}", e);
                    return Err(ScanError::SourceUnavailable(e.to_string()));
                }
                None => {
                    tracing::info!("capture source ended");
                    return Ok(ScanExit::SourceEnded);
                }
            };

            let result = match self
                .session
                .decode_tick(&capture.data, capture.width, capture.height)
            {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!("skipping unusable capture: {}", e);
                    continue;
                }
            };

            if events.send(ScanEvent::Progress(result.progress)).await.is_err() {
                return Ok(ScanExit::Stopped);
            }

            if result.complete {
                let bytes = self.session.final_bytes()?;
                tracing::info!("scan complete: {} bytes", bytes.len());
                self.session.reset();
                // The scan is over either way; a closed receiver changes nothing.
                let _ = events.send(ScanEvent::Complete(bytes)).await;
                return Ok(ScanExit::Completed);
            }
        }
    }
}
