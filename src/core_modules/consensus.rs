// THEORY:
// The consensus decoder is the memory of a scan session. Individual captures are
// noisy: a dot may be misread, a header byte may be wrong, a capture may even land
// between two animation frames. Instead of trusting any single capture, the decoder
// only commits to what repeated observations agree on.
//
// Session lifecycle:
// 1.  **Idle**: nothing seen yet.
// 2.  **Locking**: every structurally valid capture adds its declared frame total to a
//     tally. Once enough captures are tallied and the most common total holds a large
//     enough share, that total is locked for the rest of the session. A locked total
//     is never revisited; captures declaring anything else are dropped.
// 3.  **Decoding**: captures are accumulated per frame index in a sliding window. A
//     full window is reduced to one reading by a per-dot plurality vote and decoded.
//     When the voted header disagrees with the window it was voted from, the window is
//     contaminated and is thrown away. Otherwise the voted payload is stored for that
//     index, and later full windows may overwrite it.
// 4.  **Complete**: every index has a stored payload. The concatenated payloads are the
//     transfer, zero padding included.
//
// Storage is an arena indexed by frame index; a byte-sized total bounds it at 255.

use crate::config::{Config, DecoderConfig};
use crate::core_modules::frame_codec::{FrameRejection, parse_frame};
use crate::error::DecodeError;
use std::collections::VecDeque;

/// Per-dot plurality across captures. Positions missing from shorter captures are
/// voted among the captures that have them; ties go to the smaller value.
pub fn majority_vote<'a, I>(captures: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a [u8]>,
    I::IntoIter: Clone,
{
    let captures = captures.into_iter();
    let len = captures.clone().map(<[u8]>::len).max().unwrap_or(0);

    (0..len)
        .map(|position| {
            let mut counts = [0usize; 256];
            for capture in captures.clone() {
                if let Some(&value) = capture.get(position) {
                    counts[value as usize] += 1;
                }
            }
            let mut best = 0usize;
            for (value, &count) in counts.iter().enumerate() {
                if count > counts[best] {
                    best = value;
                }
            }
            best as u8
        })
        .collect()
}

/// Sliding window of raw dot-value readings for one frame index.
#[derive(Debug, Clone)]
pub struct VoteSet {
    captures: VecDeque<Vec<u8>>,
    cap: usize,
}

impl VoteSet {
    pub fn new(cap: usize) -> Self {
        Self {
            captures: VecDeque::with_capacity(cap),
            cap: cap.max(1),
        }
    }

    /// Adds a reading, evicting the oldest once the window is full.
    pub fn push(&mut self, values: Vec<u8>) {
        if self.captures.len() == self.cap {
            self.captures.pop_front();
        }
        self.captures.push_back(values);
    }

    pub fn len(&self) -> usize {
        self.captures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.captures.len() >= self.cap
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Fraction of the window filled, in [0, 1].
    pub fn fill(&self) -> f64 {
        self.captures.len() as f64 / self.cap as f64
    }

    pub fn vote(&self) -> Vec<u8> {
        majority_vote(self.captures.iter().map(Vec::as_slice))
    }

    pub fn clear(&mut self) {
        self.captures.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderPhase {
    Idle,
    /// Tallying frame totals.
    Locking,
    Decoding { total: u8 },
    Complete { total: u8 },
}

/// What one submitted capture did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Structurally invalid; the session is unchanged.
    Rejected(FrameRejection),
    /// Counted toward the total lock, which is not reached yet.
    Tallied { tallied: usize },
    /// This capture completed the lock.
    Locked { total: u8 },
    /// Declares a total other than the locked one; dropped.
    WrongTotal { locked: u8, found: u8 },
    /// Added to the window of `index`, which is not full yet.
    Accumulated { index: u8, votes: usize },
    /// The window of `index` was voted and its payload stored.
    Voted { index: u8, newly_received: bool },
    /// The voted header disagreed with the window key; the window was cleared.
    Contaminated { index: u8 },
    /// The last missing frame was voted.
    Completed,
    /// The session is already complete; the capture was ignored.
    AlreadyComplete,
}

/// Voting decoder over noisy captures of a frame sequence.
#[derive(Debug, Clone)]
pub struct ConsensusDecoder {
    bits_per_dot: u8,
    lock_min_captures: usize,
    lock_min_share: f64,
    vote_cap: usize,
    phase: DecoderPhase,
    /// Observed totals before the lock, indexed by total.
    tally: Box<[usize; 256]>,
    tallied: usize,
    buckets: Vec<VoteSet>,
    payloads: Vec<Option<Vec<u8>>>,
    received: usize,
}

impl ConsensusDecoder {
    pub fn new(config: &Config, decoder: &DecoderConfig) -> Self {
        Self {
            bits_per_dot: config.bits_per_dot(),
            lock_min_captures: decoder.lock_min_captures,
            lock_min_share: decoder.lock_min_share,
            vote_cap: decoder.vote_cap,
            phase: DecoderPhase::Idle,
            tally: Box::new([0; 256]),
            tallied: 0,
            buckets: Vec::new(),
            payloads: Vec::new(),
            received: 0,
        }
    }

    pub fn phase(&self) -> DecoderPhase {
        self.phase
    }

    pub fn locked_total(&self) -> Option<u8> {
        match self.phase {
            DecoderPhase::Decoding { total } | DecoderPhase::Complete { total } => Some(total),
            DecoderPhase::Idle | DecoderPhase::Locking => None,
        }
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.phase, DecoderPhase::Complete { .. })
    }

    /// Submits one capture, routed by its own header.
    pub fn submit(&mut self, values: &[u8]) -> SubmitOutcome {
        match parse_frame(values, self.bits_per_dot) {
            Ok(frame) => self.route(frame.index, frame.total, values),
            Err(rejection) => self.reject(rejection),
        }
    }

    /// Submits one capture into the window of an externally known frame index. The
    /// header is still parsed for its total and checked again at vote time.
    pub fn submit_keyed(&mut self, frame_index: u8, values: &[u8]) -> SubmitOutcome {
        match parse_frame(values, self.bits_per_dot) {
            Ok(frame) if frame_index >= frame.total => {
                self.reject(FrameRejection::IndexOutOfRange {
                    index: frame_index,
                    total: frame.total,
                })
            }
            Ok(frame) => self.route(frame_index, frame.total, values),
            Err(rejection) => self.reject(rejection),
        }
    }

    fn reject(&self, rejection: FrameRejection) -> SubmitOutcome {
        tracing::debug!("capture rejected: {}", rejection);
        SubmitOutcome::Rejected(rejection)
    }

    fn route(&mut self, index: u8, total: u8, values: &[u8]) -> SubmitOutcome {
        match self.phase {
            DecoderPhase::Complete { .. } => SubmitOutcome::AlreadyComplete,
            DecoderPhase::Idle | DecoderPhase::Locking => self.tally_total(total),
            DecoderPhase::Decoding { total: locked } if total != locked => {
                tracing::debug!("capture declares {} frames, locked to {}", total, locked);
                SubmitOutcome::WrongTotal {
                    locked,
                    found: total,
                }
            }
            DecoderPhase::Decoding { total: locked } => self.accumulate(index, locked, values),
        }
    }

    fn tally_total(&mut self, total: u8) -> SubmitOutcome {
        self.tally[total as usize] += 1;
        self.tallied += 1;
        self.phase = DecoderPhase::Locking;

        if self.tallied < self.lock_min_captures {
            return SubmitOutcome::Tallied {
                tallied: self.tallied,
            };
        }

        let mut plurality = 0usize;
        for (candidate, &count) in self.tally.iter().enumerate() {
            if count > self.tally[plurality] {
                plurality = candidate;
            }
        }
        let share = self.tally[plurality] as f64 / self.tallied as f64;
        if share < self.lock_min_share {
            return SubmitOutcome::Tallied {
                tallied: self.tallied,
            };
        }

        let locked = plurality as u8;
        tracing::info!(
            "locked frame total {} ({:.0}% of {} captures)",
            locked,
            share * 100.0,
            self.tallied
        );
        self.phase = DecoderPhase::Decoding { total: locked };
        self.buckets = (0..locked).map(|_| VoteSet::new(self.vote_cap)).collect();
        self.payloads = vec![None; locked as usize];
        self.received = 0;
        SubmitOutcome::Locked { total: locked }
    }

    fn accumulate(&mut self, index: u8, locked: u8, values: &[u8]) -> SubmitOutcome {
        let slot = index as usize;
        let bucket = &mut self.buckets[slot];
        bucket.push(values.to_vec());
        if !bucket.is_full() {
            return SubmitOutcome::Accumulated {
                index,
                votes: bucket.len(),
            };
        }

        let voted = bucket.vote();
        // Header-routed captures all share this header, so only keyed ones can fail here.
        let frame = match parse_frame(&voted, self.bits_per_dot) {
            Ok(frame) if frame.index == index && frame.total == locked => frame,
            _ => {
                tracing::debug!("votes for frame {} contaminated; restarting", index);
                bucket.clear();
                return SubmitOutcome::Contaminated { index };
            }
        };

        let newly_received = self.payloads[slot].is_none();
        self.payloads[slot] = Some(frame.payload);
        if newly_received {
            self.received += 1;
            tracing::info!("frame {} voted ({}/{})", index, self.received, locked);
        }

        if self.received == locked as usize {
            self.phase = DecoderPhase::Complete { total: locked };
            tracing::info!("all {} frames received", locked);
            return SubmitOutcome::Completed;
        }
        SubmitOutcome::Voted {
            index,
            newly_received,
        }
    }

    /// Voted frames plus the fill of pending windows, over the locked total.
    pub fn progress(&self) -> f64 {
        match self.phase {
            DecoderPhase::Idle | DecoderPhase::Locking => 0.0,
            DecoderPhase::Complete { .. } => 1.0,
            DecoderPhase::Decoding { total } => {
                let partial: f64 = self
                    .buckets
                    .iter()
                    .zip(&self.payloads)
                    .filter(|(_, payload)| payload.is_none())
                    .map(|(bucket, _)| bucket.fill())
                    .sum();
                ((self.received as f64 + partial) / total as f64).clamp(0.0, 1.0)
            }
        }
    }

    /// Concatenated payloads in frame order. Padding is not trimmed.
    pub fn final_bytes(&self) -> Result<Vec<u8>, DecodeError> {
        let incomplete = || DecodeError::Incomplete {
            received: self.received,
            total: self.locked_total(),
        };
        if !self.is_complete() {
            return Err(incomplete());
        }
        let mut bytes = Vec::new();
        for payload in &self.payloads {
            bytes.extend_from_slice(payload.as_deref().ok_or_else(incomplete)?);
        }
        Ok(bytes)
    }

    pub fn reset(&mut self) {
        self.phase = DecoderPhase::Idle;
        self.tally.fill(0);
        self.tallied = 0;
        self.buckets.clear();
        self.payloads.clear();
        self.received = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::frame_codec::Encoder;

    fn decoder(lock_min: usize, vote_cap: usize) -> ConsensusDecoder {
        let tuning = DecoderConfig::builder()
            .lock_rule(lock_min, 0.30)
            .vote_cap(vote_cap)
            .build()
            .unwrap();
        ConsensusDecoder::new(&Config::default(), &tuning)
    }

    #[test]
    fn majority_survives_two_adversarial_captures() {
        let truth: Vec<u8> = (0..60).map(|i| (i % 8) as u8).collect();
        let mut captures = vec![truth.clone(); 3];
        captures.push(truth.iter().map(|v| (v + 1) % 8).collect());
        captures.push(truth.iter().map(|v| (v + 3) % 8).collect());
        assert_eq!(majority_vote(captures.iter().map(Vec::as_slice)), truth);

        // Wrong readers may even agree with each other.
        let liar: Vec<u8> = truth.iter().map(|v| 7 - v).collect();
        let captures = [&truth, &liar, &truth, &liar, &truth];
        assert_eq!(majority_vote(captures.iter().map(|c| c.as_slice())), truth);
    }

    #[test]
    fn vote_window_slides() {
        let mut set = VoteSet::new(3);
        for v in [1u8, 1, 2, 2] {
            set.push(vec![v]);
        }
        assert_eq!(set.len(), 3);
        assert!(set.is_full());
        assert_eq!(set.vote(), vec![2]);
        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.fill(), 0.0);
    }

    #[test]
    fn malformed_captures_change_nothing() {
        let mut decoder = decoder(10, 5);
        assert!(matches!(decoder.submit(&[]), SubmitOutcome::Rejected(FrameRejection::Empty)));
        let zero_total = Encoder::new(Config::default()).frame_values(0, 0, b"x");
        assert_eq!(
            decoder.submit(&zero_total),
            SubmitOutcome::Rejected(FrameRejection::ZeroTotal)
        );
        let out_of_range = Encoder::new(Config::default()).frame_values(4, 3, b"x");
        assert!(matches!(
            decoder.submit(&out_of_range),
            SubmitOutcome::Rejected(FrameRejection::IndexOutOfRange { .. })
        ));
        assert_eq!(decoder.phase(), DecoderPhase::Idle);
        assert_eq!(decoder.progress(), 0.0);
    }

    #[test]
    fn lock_requires_count_and_share() {
        let encoder = Encoder::new(Config::default());
        let mut decoder = decoder(10, 5);
        // Ten captures with ten different totals: no total reaches 30%.
        for total in 1..=10u8 {
            decoder.submit(&encoder.frame_values(0, total, b""));
        }
        assert_eq!(decoder.phase(), DecoderPhase::Locking);
        // Total 4 now holds 3 of 12 (25%), then 4 of 13 (31%).
        decoder.submit(&encoder.frame_values(0, 4, b""));
        assert!(matches!(
            decoder.submit(&encoder.frame_values(0, 4, b"")),
            SubmitOutcome::Tallied { tallied: 12 }
        ));
        assert_eq!(
            decoder.submit(&encoder.frame_values(1, 4, b"")),
            SubmitOutcome::Locked { total: 4 }
        );
        assert_eq!(decoder.locked_total(), Some(4));
    }

    #[test]
    fn locked_total_ignores_other_totals() {
        let encoder = Encoder::new(Config::default());
        let mut decoder = decoder(10, 5);
        for _ in 0..10 {
            decoder.submit(&encoder.frame_values(0, 3, b"abc"));
        }
        assert_eq!(decoder.locked_total(), Some(3));
        for _ in 0..50 {
            assert_eq!(
                decoder.submit(&encoder.frame_values(0, 7, b"abc")),
                SubmitOutcome::WrongTotal { locked: 3, found: 7 }
            );
        }
        assert_eq!(decoder.locked_total(), Some(3));
        assert_eq!(decoder.progress(), 0.0);
    }

    #[test]
    fn votes_reassemble_and_progress_counts_partials() {
        let encoder = Encoder::new(Config::default());
        let data: Vec<u8> = (0u8..45).collect();
        let frames = encoder.encode(&data);
        let mut decoder = decoder(1, 5);
        decoder.submit(&frames[0].dot_values());
        assert_eq!(decoder.locked_total(), Some(3));

        for _ in 0..5 {
            decoder.submit(&frames[1].dot_values());
        }
        for _ in 0..2 {
            decoder.submit(&frames[2].dot_values());
        }
        assert!(matches!(
            decoder.final_bytes(),
            Err(DecodeError::Incomplete {
                received: 1,
                total: Some(3)
            })
        ));
        assert!((decoder.progress() - (1.0 + 0.4) / 3.0).abs() < 1e-9);

        for frame in [&frames[2], &frames[2], &frames[2], &frames[0], &frames[0]] {
            decoder.submit(&frame.dot_values());
        }
        for _ in 0..3 {
            decoder.submit(&frames[0].dot_values());
        }
        assert!(decoder.is_complete());
        assert_eq!(decoder.progress(), 1.0);
        let bytes = decoder.final_bytes().unwrap();
        assert_eq!(bytes.len(), 60);
        assert_eq!(&bytes[..45], &data[..]);
        assert!(bytes[45..].iter().all(|&b| b == 0));
        assert_eq!(decoder.submit(&frames[1].dot_values()), SubmitOutcome::AlreadyComplete);
    }

    #[test]
    fn misrouted_header_reads_do_not_corrupt_frame_zero() {
        let encoder = Encoder::new(Config::default());
        let payload = b"first frame payload!";
        let clean = encoder.frame_values(0, 3, payload);
        let misread = encoder.frame_values(1, 3, payload);
        let mut decoder = decoder(1, 5);
        decoder.submit(&clean);

        for _ in 0..3 {
            decoder.submit(&clean);
        }
        for _ in 0..2 {
            assert!(matches!(
                decoder.submit(&misread),
                SubmitOutcome::Accumulated { index: 1, .. }
            ));
        }
        decoder.submit(&clean);
        assert_eq!(
            decoder.submit(&clean),
            SubmitOutcome::Voted {
                index: 0,
                newly_received: true
            }
        );
        assert_eq!(decoder.received(), 1);
        assert_eq!(decoder.payloads[0].as_deref(), Some(&payload[..]));
    }

    #[test]
    fn contaminated_window_is_discarded() {
        let encoder = Encoder::new(Config::default());
        let payload = b"first frame payload!";
        let clean = encoder.frame_values(0, 3, payload);
        let misread = encoder.frame_values(1, 3, payload);
        let mut decoder = decoder(1, 5);
        decoder.submit(&clean);

        for capture in [&clean, &clean, &misread, &misread] {
            decoder.submit_keyed(0, capture);
        }
        assert_eq!(
            decoder.submit_keyed(0, &misread),
            SubmitOutcome::Contaminated { index: 0 }
        );
        assert_eq!(decoder.received(), 0);
        assert!(decoder.buckets[0].is_empty());
        assert!(decoder.payloads[0].is_none());

        // Accumulation restarts from scratch.
        for _ in 0..4 {
            decoder.submit_keyed(0, &clean);
        }
        assert_eq!(
            decoder.submit_keyed(0, &clean),
            SubmitOutcome::Voted {
                index: 0,
                newly_received: true
            }
        );
        assert_eq!(decoder.payloads[0].as_deref(), Some(&payload[..]));
    }

    #[test]
    fn header_routed_windows_keep_their_header() {
        let encoder = Encoder::new(Config::default());
        let mut decoder = decoder(1, 3);
        decoder.submit(&encoder.frame_values(0, 3, b""));

        // Bodies disagree everywhere; the shared header still survives every vote.
        let outcomes: Vec<SubmitOutcome> = (0u8..6)
            .map(|i| decoder.submit(&encoder.frame_values(0, 3, &[i * 41; 20])))
            .collect();
        assert!(!outcomes
            .iter()
            .any(|o| matches!(o, SubmitOutcome::Contaminated { .. })));
        assert_eq!(
            outcomes[2],
            SubmitOutcome::Voted {
                index: 0,
                newly_received: true
            }
        );
        assert_eq!(
            outcomes[5],
            SubmitOutcome::Voted {
                index: 0,
                newly_received: false
            }
        );
    }

    #[test]
    fn keyed_index_must_fit_the_total() {
        let encoder = Encoder::new(Config::default());
        let mut decoder = decoder(1, 5);
        let capture = encoder.frame_values(0, 2, b"");
        assert!(matches!(
            decoder.submit_keyed(2, &capture),
            SubmitOutcome::Rejected(FrameRejection::IndexOutOfRange { index: 2, total: 2 })
        ));
    }

    #[test]
    fn reset_returns_to_idle() {
        let encoder = Encoder::new(Config::default());
        let mut decoder = decoder(1, 1);
        let frames = encoder.encode(b"hi");
        decoder.submit(&frames[0].dot_values());
        decoder.submit(&frames[0].dot_values());
        assert!(decoder.is_complete());
        decoder.reset();
        assert_eq!(decoder.phase(), DecoderPhase::Idle);
        assert_eq!(decoder.received(), 0);
        assert!(decoder.final_bytes().is_err());
    }
}
