//! PCM frames and datagram reassembly
//!
//! The ingest stream is raw signed 16-bit little-endian mono PCM with no
//! framing beyond datagram boundaries. Frames are rebuilt by byte count.

/// Ingest sample rate (must match the capture side)
pub const SAMPLE_RATE: u32 = 48_000;

/// Bytes per sample (s16le)
pub const SAMPLE_WIDTH: usize = 2;

/// Frame duration in milliseconds
pub const FRAME_MS: u32 = 20;

/// Samples per frame
pub const FRAME_SAMPLES: usize = (SAMPLE_RATE * FRAME_MS / 1000) as usize;

/// Bytes per frame
pub const FRAME_BYTES: usize = FRAME_SAMPLES * SAMPLE_WIDTH;

/// A fixed-duration slice of PCM audio, the unit of VAD decisions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Box<[u8]>,
}

impl Frame {
    /// Build a frame from exactly [`FRAME_BYTES`] bytes
    ///
    /// Returns `None` when the slice has the wrong length
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        (bytes.len() == FRAME_BYTES).then(|| Self {
            bytes: bytes.into(),
        })
    }

    /// Raw PCM bytes of the frame
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Root-mean-square amplitude of the frame's samples (i16 scale)
    #[must_use]
    pub fn energy(&self) -> f32 {
        pcm_rms(&self.bytes)
    }
}

/// Root-mean-square amplitude of s16le PCM bytes
///
/// A trailing odd byte is ignored.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn pcm_rms(pcm: &[u8]) -> f32 {
    let mut count = 0usize;
    let sum_squares: f64 = pcm
        .chunks_exact(SAMPLE_WIDTH)
        .map(|pair| {
            count += 1;
            let sample = f64::from(i16::from_le_bytes([pair[0], pair[1]]));
            sample * sample
        })
        .sum();

    if count == 0 {
        return 0.0;
    }

    #[allow(clippy::cast_possible_truncation)]
    let rms = (sum_squares / count as f64).sqrt() as f32;
    rms
}

/// Duration in seconds of a PCM buffer at the ingest rate
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn pcm_duration_secs(pcm: &[u8]) -> f32 {
    pcm.len() as f32 / (SAMPLE_RATE as f32 * SAMPLE_WIDTH as f32)
}

/// Reassembles arbitrary-size datagrams into whole frames
#[derive(Debug, Default)]
pub struct FrameAssembler {
    carry: Vec<u8>,
}

impl FrameAssembler {
    /// Create an empty assembler
    #[must_use]
    pub const fn new() -> Self {
        Self { carry: Vec::new() }
    }

    /// Append a datagram and return every frame it completes
    ///
    /// Bytes that do not fill a frame are kept for the next call.
    pub fn push(&mut self, datagram: &[u8]) -> Vec<Frame> {
        self.carry.extend_from_slice(datagram);

        let whole = self.carry.len() / FRAME_BYTES * FRAME_BYTES;
        let frames = self.carry[..whole]
            .chunks_exact(FRAME_BYTES)
            .filter_map(Frame::from_bytes)
            .collect();
        self.carry.drain(..whole);

        frames
    }

    /// Number of buffered bytes not yet forming a frame
    #[must_use]
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    /// Drop any partial frame
    pub fn clear(&mut self) {
        self.carry.clear();
    }
}
