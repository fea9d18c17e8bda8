//! Completion-endpoint clients for Sproutline.
//!
//! One implementation today: [`OpenAiCompatClient`], which covers OpenAI
//! and every endpoint exposing an OpenAI-compatible `/chat/completions`.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatClient;
