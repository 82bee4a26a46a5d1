//! Voice trigger subsystem.
//!
//! Continuous speech recognition feeding a codeword matcher: when a
//! configured phrase (or the built-in default) is heard, the engine fires
//! an SOS activation and keeps listening after a cooldown.

pub mod codewords;
pub mod engine;
pub mod speech;

pub use codewords::{default_codeword, match_codeword, CodeWord, DEFAULT_CODEWORD_ID};
pub use engine::VoiceTriggerEngine;
pub use speech::{SpeechError, SpeechEvent, SpeechSession, SpeechSource};
