// THEORY:
// The frame codec is the bit-exact wire format between a byte payload and the ordered
// dot values of one animation frame.
//
// Frame byte image:  [frame index: 1][frame total: 1][payload ... zero padding]
// Bit order:         MSB-first within each byte, regrouped into `bits_per_dot`-wide
//                    groups, MSB-first within each group, consumed in layout order.
//
// Decoding is the exact inverse: concatenate each dot's bits MSB-first, regroup into
// whole bytes (trailing partial bits are dropped) and split the header off. The
// payload keeps its zero padding; the true payload length travels out of band.

use crate::config::Config;
use crate::core_modules::geometry::{Dot, Layout};
use crate::error::CodecError;
use thiserror::Error;

pub const HEADER_BYTES: usize = 2;
/// Frame index and total are single bytes.
pub const MAX_FRAMES: usize = 255;

/// Expands bytes into individual bits, MSB first.
pub fn bytes_to_bits(data: &[u8]) -> Vec<u8> {
    data.iter()
        .flat_map(|&byte| (0..8).rev().map(move |shift| (byte >> shift) & 1))
        .collect()
}

/// Packs bytes into `bits_per_dot`-wide values. Trailing bits that do not fill a
/// whole group are dropped.
pub fn bytes_to_dot_values(data: &[u8], bits_per_dot: u8) -> Vec<u8> {
    let width = (bits_per_dot as usize).min(8);
    if width == 0 {
        return Vec::new();
    }
    bytes_to_bits(data)
        .chunks_exact(width)
        .map(|group| group.iter().fold(0u8, |acc, &bit| (acc << 1) | bit))
        .collect()
}

/// Inverse of [`bytes_to_dot_values`]: yields `floor(values.len() * bits_per_dot / 8)` bytes.
/// Value bits above `bits_per_dot` are ignored.
pub fn dot_values_to_bytes(values: &[u8], bits_per_dot: u8) -> Vec<u8> {
    let width = (bits_per_dot as usize).min(8);
    let bits: Vec<u8> = values
        .iter()
        .flat_map(|&value| (0..width).rev().map(move |shift| (value >> shift) & 1))
        .collect();
    bits.chunks_exact(8)
        .map(|byte| byte.iter().fold(0u8, |acc, &bit| (acc << 1) | bit))
        .collect()
}

/// Why a decoded reading cannot be a frame.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameRejection {
    #[error("no dot values")]
    Empty,
    /// Fewer than two header bytes decoded.
    #[error("fewer than two header bytes")]
    TooShort(#[from] CodecError),
    #[error("frame total is zero")]
    ZeroTotal,
    /// Header index is not below the declared total.
    #[error("frame index {index} not below total {total}")]
    IndexOutOfRange { index: u8, total: u8 },
    /// Header total disagrees with the total already established for the transfer.
    #[error("frame total {found} disagrees with established total {expected}")]
    TotalMismatch { expected: u8, found: u8 },
}

/// Header and (padded) payload recovered from one frame's dot values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub index: u8,
    pub total: u8,
    pub payload: Vec<u8>,
}

impl DecodedFrame {
    /// Header sanity: `0 <= index < total`. A byte-sized total can never exceed 255.
    pub fn validate(&self) -> Result<(), FrameRejection> {
        if self.total == 0 {
            return Err(FrameRejection::ZeroTotal);
        }
        if self.index >= self.total {
            return Err(FrameRejection::IndexOutOfRange {
                index: self.index,
                total: self.total,
            });
        }
        Ok(())
    }
}

/// Decodes one frame's dot values into header and payload.
pub fn decode_frame(values: &[u8], bits_per_dot: u8) -> Result<DecodedFrame, CodecError> {
    let mut bytes = dot_values_to_bytes(values, bits_per_dot);
    if bytes.len() < HEADER_BYTES {
        return Err(CodecError::TooShort {
            available_bits: values.len() * bits_per_dot as usize,
        });
    }
    let payload = bytes.split_off(HEADER_BYTES);
    Ok(DecodedFrame {
        index: bytes[0],
        total: bytes[1],
        payload,
    })
}

/// Decodes and validates in one step.
pub fn parse_frame(values: &[u8], bits_per_dot: u8) -> Result<DecodedFrame, FrameRejection> {
    if values.is_empty() {
        return Err(FrameRejection::Empty);
    }
    let frame = decode_frame(values, bits_per_dot)?;
    frame.validate()?;
    Ok(frame)
}

/// One animation step as produced by the encode side.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub index: u8,
    pub total: u8,
    pub dots: Vec<Dot>,
    /// Payload bytes carried by this frame, without padding.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Dot values in wire order.
    pub fn dot_values(&self) -> Vec<u8> {
        self.dots.iter().map(|dot| dot.value).collect()
    }
}

/// Splits arbitrary bytes into dotbeam frames.
#[derive(Debug, Clone)]
pub struct Encoder {
    config: Config,
    layout: Layout,
}

impl Encoder {
    pub fn new(config: Config) -> Self {
        Self {
            layout: Layout::new(&config),
            config,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Encodes `data` into at most 255 frames. Empty input, or a configuration with no
    /// payload capacity, yields no frames.
    pub fn encode(&self, data: &[u8]) -> Vec<Frame> {
        let bytes_per_frame = self.config.bytes_per_frame();
        if bytes_per_frame == 0 || data.is_empty() {
            return Vec::new();
        }

        let mut total_frames = data.len().div_ceil(bytes_per_frame);
        if total_frames > MAX_FRAMES {
            tracing::warn!(
                "payload of {} bytes exceeds {} frames; truncating to {} bytes",
                data.len(),
                MAX_FRAMES,
                MAX_FRAMES * bytes_per_frame
            );
            total_frames = MAX_FRAMES;
        }

        data.chunks(bytes_per_frame)
            .take(total_frames)
            .enumerate()
            .map(|(i, chunk)| {
                let values = self.frame_values(i as u8, total_frames as u8, chunk);
                Frame {
                    index: i as u8,
                    total: total_frames as u8,
                    dots: self.layout.dots(&values),
                    payload: chunk.to_vec(),
                }
            })
            .collect()
    }

    /// Dot values for one frame: header + payload, zero-padded to the frame's whole
    /// byte capacity (rounded up so no trailing dot bits are lost).
    pub fn frame_values(&self, index: u8, total: u8, payload: &[u8]) -> Vec<u8> {
        let padded_len = self.config.bits_per_frame().div_ceil(8);
        let mut bytes = Vec::with_capacity(padded_len.max(HEADER_BYTES + payload.len()));
        bytes.push(index);
        bytes.push(total);
        bytes.extend_from_slice(payload);
        if bytes.len() < padded_len {
            bytes.resize(padded_len, 0);
        }

        let mut values = bytes_to_dot_values(&bytes, self.config.bits_per_dot());
        values.truncate(self.layout.total_dots());
        values
    }
}
