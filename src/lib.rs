//! Murmur Gateway - voice and text front end for a generative assistant
//!
//! This library provides the request pipeline behind the Murmur web page:
//! - Fuzzy response cache keyed on token-set similarity
//! - Fallback chain across generative backend tiers
//! - Bounded per-session chat history
//! - Speech-to-text in front of and text-to-speech behind each answer
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Web page                          │
//! │   /text_input  │  /process_audio  │  /history  │ ... │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                Request orchestrator                  │
//! │   Response cache  │  Fallback chain  │  History      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Backend tiers                        │
//! │   gemini/<model> ...  │  gemini-chat/<model>         │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod history;
pub mod orchestrator;
pub mod similarity;
pub mod voice;

pub use backend::{APOLOGY, Backend, BackendOutcome, FallbackChain};
pub use cache::ResponseCache;
pub use config::Config;
pub use error::{Error, Result};
pub use history::{ChatHistory, ChatHistoryEntry, SessionStore};
pub use orchestrator::{Reply, RequestOrchestrator};
