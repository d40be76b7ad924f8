//! End-of-utterance detection
//!
//! Energy-based: an utterance starts on the first loud block and ends after
//! a run of quiet blocks once enough speech has been heard.

use super::capture::rms_level;

/// Minimum RMS level to consider a block speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum speech before silence may end the utterance (0.3 s at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Trailing silence that ends the utterance (0.8 s at 16kHz)
const SILENCE_SAMPLES: usize = 12_800;

/// Progress of the current utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceState {
    /// No speech heard yet
    Waiting,
    /// Speech in progress
    Speaking,
    /// Speech followed by enough silence
    Complete,
}

/// Tracks a single utterance across captured blocks
#[derive(Debug)]
pub struct UtteranceDetector {
    state: UtteranceState,
    speech_samples: usize,
    silence_samples: usize,
}

impl Default for UtteranceDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl UtteranceDetector {
    /// Create a detector waiting for speech
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: UtteranceState::Waiting,
            speech_samples: 0,
            silence_samples: 0,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> UtteranceState {
        self.state
    }

    /// Whether any speech has been heard
    #[must_use]
    pub fn heard_speech(&self) -> bool {
        self.state != UtteranceState::Waiting
    }

    /// Feed one block of samples; returns true once the utterance is complete
    pub fn process(&mut self, samples: &[f32]) -> bool {
        if samples.is_empty() {
            return self.state == UtteranceState::Complete;
        }

        let energy = rms_level(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            UtteranceState::Waiting => {
                if is_speech {
                    self.state = UtteranceState::Speaking;
                    self.speech_samples = samples.len();
                    self.silence_samples = 0;
                    tracing::trace!(energy, "speech started");
                }
            }
            UtteranceState::Speaking => {
                if is_speech {
                    self.speech_samples += samples.len();
                    self.silence_samples = 0;
                } else {
                    self.silence_samples += samples.len();
                }

                if self.silence_samples > SILENCE_SAMPLES
                    && self.speech_samples > MIN_SPEECH_SAMPLES
                {
                    tracing::debug!(speech = self.speech_samples, "utterance complete");
                    self.state = UtteranceState::Complete;
                }
            }
            UtteranceState::Complete => {}
        }

        self.state == UtteranceState::Complete
    }
}
