//! Deterministic reference synthesizer.
//!
//! Renders one sine tone per word: pitch keyed by voice and word, length
//! by word length and speed. The same job always produces the same
//! samples.

use std::f64::consts::TAU;

use async_trait::async_trait;

use wykit_core::types::{PcmAudio, SynthesisJob, MAX_OUTPUT_SAMPLES};
use wykit_core::wav::f32_to_i16;
use wykit_core::SynthError;

use crate::synth::Synthesizer;

/// KittenTTS voice ids, used as the default voice set.
pub const EXPR_VOICES: [&str; 8] = [
    "expr-voice-2-m",
    "expr-voice-2-f",
    "expr-voice-3-m",
    "expr-voice-3-f",
    "expr-voice-4-m",
    "expr-voice-4-f",
    "expr-voice-5-m",
    "expr-voice-5-f",
];

const WORD_BASE_SECS: f64 = 0.06;
const SECS_PER_CHAR: f64 = 0.025;
const GAP_SECS: f64 = 0.04;
const FADE_SECS: f64 = 0.005;
const AMPLITUDE: f64 = 0.3;
const MAX_UTTERANCE_SECS: f64 = 600.0;

pub struct ToneSynthesizer {
    voices: Vec<String>,
    /// Fixed render rate. `None` renders at the requested rate.
    output_rate: Option<u32>,
}

impl Default for ToneSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ToneSynthesizer {
    pub fn new() -> Self {
        Self::with_voices(EXPR_VOICES)
    }

    pub fn with_voices<I, S>(voices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            voices: voices.into_iter().map(Into::into).collect(),
            output_rate: None,
        }
    }

    /// Always render at `rate`, like a model with a fixed native rate.
    pub fn with_output_rate(mut self, rate: u32) -> Self {
        self.output_rate = Some(rate);
        self
    }

    fn render(&self, job: &SynthesisJob, rate: u32) -> Result<Vec<i16>, SynthError> {
        let words: Vec<&str> = job.text.split_whitespace().collect();
        if words.is_empty() {
            return Err(SynthError::EmptyInput);
        }

        let voice = job.voice.index();
        if voice >= self.voices.len() {
            return Err(SynthError::internal(format!("no tone voice at index {voice}")));
        }

        let word_secs: Vec<f64> = words
            .iter()
            .map(|w| (WORD_BASE_SECS + SECS_PER_CHAR * w.chars().count() as f64) / job.speed)
            .collect();
        let gap_secs = GAP_SECS / job.speed;
        let total_secs = word_secs.iter().sum::<f64>() + gap_secs * (words.len() - 1) as f64;
        if total_secs > MAX_UTTERANCE_SECS {
            return Err(SynthError::internal(format!(
                "utterance of {total_secs:.1}s exceeds {MAX_UTTERANCE_SECS}s"
            )));
        }

        let rate = rate as f64;
        let total_samples = (total_secs * rate).ceil();
        if total_samples > MAX_OUTPUT_SAMPLES as f64 {
            return Err(SynthError::internal(format!(
                "utterance of {total_samples} samples exceeds limit of {MAX_OUTPUT_SAMPLES}"
            )));
        }
        let base_hz = 110.0 + 18.0 * voice as f64;
        let gap = vec![0.0f32; (gap_secs * rate).round() as usize];
        let mut out: Vec<f32> = Vec::with_capacity(total_samples as usize);

        for (i, (word, secs)) in words.iter().zip(&word_secs).enumerate() {
            if i > 0 {
                out.extend_from_slice(&gap);
            }
            let step = word.chars().map(|c| c as u32).sum::<u32>() % 7;
            let hz = base_hz * (1.0 + 0.06 * step as f64);
            let len = (secs * rate).round() as usize;
            let fade = ((FADE_SECS * rate) as usize).clamp(1, (len / 2).max(1));
            out.extend((0..len).map(|n| {
                let env = (n.min(len - 1 - n) as f64 / fade as f64).min(1.0);
                (AMPLITUDE * env * (TAU * hz * n as f64 / rate).sin()) as f32
            }));
        }

        Ok(f32_to_i16(&out))
    }
}

#[async_trait]
impl Synthesizer for ToneSynthesizer {
    fn name(&self) -> &str {
        "tone"
    }

    fn voices(&self) -> Vec<String> {
        self.voices.clone()
    }

    async fn synthesize(&self, job: &SynthesisJob) -> Result<PcmAudio, SynthError> {
        let rate = self.output_rate.unwrap_or(job.sample_rate);
        let samples = self.render(job, rate)?;
        Ok(PcmAudio::new(samples, rate))
    }
}
