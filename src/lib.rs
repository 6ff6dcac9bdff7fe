// THEORY:
// This file is the main entry point for the `dotbeam` library crate, the receive side
// of a visual data-transfer protocol. A sender animates bytes as frames of colored dots
// on concentric rings around three white anchors; this crate watches camera captures
// of that animation and reconstructs the bytes.
//
// The public surface is small:
// - `DecoderSession` (in `pipeline`) is the synchronous, caller-ticked decoder. One
//   RGBA capture goes in, progress and completion come out.
// - `scanner` drives a session from an async stream of captures on a fixed tick.
// - `Config` / `DecoderConfig` hold the protocol and the tuning knobs.
// The algorithmic stages (`core_modules`) are public for testing and tooling, but a
// consumer only needs the session.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod scanner;

pub use config::{Config, DecoderConfig, DecoderConfigBuilder};
pub use core_modules::frame_codec::{Encoder, Frame};
pub use core_modules::geometry::Layout;
pub use error::{BufferError, CodecError, ConfigError, DecodeError, ScanError};
pub use pipeline::{DebugSnapshot, DecoderSession, TickOutcome, TickResult};
pub use scanner::{Capture, ScanEvent, ScanExit, ScanHandle, Scanner};
