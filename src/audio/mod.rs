//! Speech audio pipeline
//!
//! Base64 payload → raw PCM bytes → normalized [`AudioBuffer`] → speakers.

pub mod decode;
pub mod pcm;
pub mod playback;

pub use decode::decode_base64;
pub use pcm::{AudioBuffer, SPEECH_CHANNELS, SPEECH_SAMPLE_RATE};
pub use playback::{AudioOutputPort, CpalOutput, PlaybackScheduler};
