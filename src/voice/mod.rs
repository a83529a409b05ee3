//! Voice processing module
//!
//! Speech-to-text for spoken queries, text-to-speech for replies, and the
//! voice settings synthesis reads from.

mod settings;
mod stt;
mod tts;

pub use settings::{FloatInput, SharedVoiceSettings, VoiceSettings, VoiceSettingsUpdate};
pub use stt::{SpeechToText, Transcriber};
pub use tts::{Synthesizer, TextToSpeech};
