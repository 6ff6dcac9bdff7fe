//! Direct reassembly from trusted frame readings.
//!
//! Where [`crate::core_modules::consensus::ConsensusDecoder`] votes over noisy captures,
//! the assembler takes each reading at face value: the first valid reading of an index
//! is kept, repeats are ignored. It fits noiseless sources such as frames handed over
//! by an [`crate::core_modules::frame_codec::Encoder`] or an already voted stream.

use crate::config::Config;
use crate::core_modules::frame_codec::{FrameRejection, parse_frame};
use crate::core_modules::geometry::Dot;
use crate::error::DecodeError;

#[derive(Debug, Clone)]
pub struct FrameAssembler {
    bits_per_dot: u8,
    total: Option<u8>,
    payloads: Vec<Option<Vec<u8>>>,
    received: usize,
}

impl FrameAssembler {
    pub fn new(config: &Config) -> Self {
        Self {
            bits_per_dot: config.bits_per_dot(),
            total: None,
            payloads: Vec::new(),
            received: 0,
        }
    }

    /// Adds one frame's dot values. Returns whether every frame is now present.
    ///
    /// The first valid reading fixes the total; readings declaring another total
    /// are rejected.
    pub fn add_frame(&mut self, values: &[u8]) -> Result<bool, FrameRejection> {
        let frame = parse_frame(values, self.bits_per_dot)?;

        match self.total {
            None => {
                self.total = Some(frame.total);
                self.payloads = vec![None; frame.total as usize];
            }
            Some(expected) if expected != frame.total => {
                return Err(FrameRejection::TotalMismatch {
                    expected,
                    found: frame.total,
                });
            }
            Some(_) => {}
        }

        let slot = &mut self.payloads[frame.index as usize];
        if slot.is_none() {
            *slot = Some(frame.payload);
            self.received += 1;
        }
        Ok(self.is_complete())
    }

    pub fn add_dots(&mut self, dots: &[Dot]) -> Result<bool, FrameRejection> {
        let values: Vec<u8> = dots.iter().map(|dot| dot.value).collect();
        self.add_frame(&values)
    }

    pub fn is_complete(&self) -> bool {
        self.total.is_some_and(|total| self.received == total as usize)
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn total(&self) -> Option<u8> {
        self.total
    }

    /// Fraction of frames received, 0 until the total is known.
    pub fn progress(&self) -> f64 {
        match self.total {
            Some(total) => self.received as f64 / total as f64,
            None => 0.0,
        }
    }

    /// Concatenated payloads in frame order, padding included.
    pub fn data(&self) -> Result<Vec<u8>, DecodeError> {
        let incomplete = DecodeError::Incomplete {
            received: self.received,
            total: self.total,
        };
        if !self.is_complete() {
            return Err(incomplete);
        }
        let mut data = Vec::new();
        for payload in &self.payloads {
            data.extend_from_slice(payload.as_deref().ok_or(incomplete)?);
        }
        Ok(data)
    }

    pub fn reset(&mut self) {
        self.total = None;
        self.payloads.clear();
        self.received = 0;
    }
}
