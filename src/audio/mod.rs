//! # Audio Helpers
//!
//! Decoding support for the transcription pipeline: converted MP3s are
//! turned into the 16 kHz mono float PCM that the speech model expects.

pub mod decode;

pub use decode::{decode_to_f32, WHISPER_SAMPLE_RATE};
