//! Multi-track audio assembly (spec §4.6): pad each track to a common zero
//! timestamp, mix the padded tracks down to mono, and derive a loudness
//! envelope for the waveform preview. Operates on decoded PCM — the actual
//! wire codec (48 kHz / 64 kbps Opus, per the canonical constants below) is
//! an external-service concern the blob store handles on the way in/out.

/// Canonical re-encode target for padded tracks (spec §4.6 / §10).
pub const OPUS_STANDARD_SAMPLE_RATE: u32 = 48_000;
pub const OPUS_DEFAULT_BIT_RATE: u32 = 64_000;

/// Waveform preview resolution (spec §4.5 step 5: "≈255 segments").
pub const WAVEFORM_SEGMENTS: usize = 255;

#[derive(Debug, Clone)]
pub struct AudioTrack {
    pub track_index: u32,
    pub sample_rate: u32,
    /// Mono PCM samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// This track's start time relative to the recording, in seconds.
    pub start_offset: f64,
}

impl AudioTrack {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Prepend `(start_offset - t0)` seconds of silence to `track` so every
/// track shares a common zero timestamp at `t0` (spec §4.6 "Pad"). `t0` must
/// be `<= track.start_offset`; the earliest track's own padding is a no-op.
pub fn pad_track(track: &AudioTrack, t0: f64) -> AudioTrack {
    let silence_secs = (track.start_offset - t0).max(0.0);
    let silence_samples = (silence_secs * track.sample_rate as f64).round() as usize;
    let mut padded = Vec::with_capacity(silence_samples + track.samples.len());
    padded.resize(silence_samples, 0.0);
    padded.extend_from_slice(&track.samples);
    AudioTrack {
        track_index: track.track_index,
        sample_rate: track.sample_rate,
        samples: padded,
        start_offset: t0,
    }
}

/// Earliest start offset across tracks — the `T0` that every other track
/// pads toward (spec §4.6).
pub fn earliest_start(tracks: &[AudioTrack]) -> f64 {
    tracks
        .iter()
        .map(|t| t.start_offset)
        .fold(f64::INFINITY, f64::min)
}

/// Sum padded tracks into a single mono stream, scaling by `1/sqrt(N)`
/// before summing and clamping to `[-1.0, 1.0]` to avoid clipping (spec
/// §4.6 "Mixdown"). All inputs are assumed already padded to the same t=0.
pub fn mixdown(tracks: &[AudioTrack]) -> Vec<f32> {
    if tracks.is_empty() {
        return Vec::new();
    }
    let scale = 1.0 / (tracks.len() as f32).sqrt();
    let len = tracks.iter().map(|t| t.samples.len()).max().unwrap_or(0);
    let mut out = vec![0.0f32; len];
    for track in tracks {
        for (i, sample) in track.samples.iter().enumerate() {
            out[i] += sample * scale;
        }
    }
    for sample in &mut out {
        *sample = sample.clamp(-1.0, 1.0);
    }
    out
}

/// Split `samples` into `WAVEFORM_SEGMENTS` equal-duration windows and emit
/// the peak absolute amplitude of each, normalised to `0..128` as `u8`
/// (spec §4.6 "Waveform"). Deterministic given the same input.
pub fn waveform(samples: &[f32]) -> Vec<u8> {
    if samples.is_empty() {
        return vec![0; WAVEFORM_SEGMENTS];
    }
    let window = (samples.len() as f64 / WAVEFORM_SEGMENTS as f64).ceil().max(1.0) as usize;
    (0..WAVEFORM_SEGMENTS)
        .map(|i| {
            let start = i * window;
            if start >= samples.len() {
                return 0u8;
            }
            let end = (start + window).min(samples.len());
            let peak = samples[start..end]
                .iter()
                .fold(0.0f32, |acc, s| acc.max(s.abs()));
            (peak.clamp(0.0, 1.0) * 128.0).round() as u8
        })
        .collect()
}

/// Encode PCM samples as raw little-endian `f32` bytes — the blob-store
/// wire format this pipeline uses in place of a real Opus codec (the
/// external codec itself is out of scope; only the numeric assembly is).
pub fn encode_pcm(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

pub fn decode_pcm(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
