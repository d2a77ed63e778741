//! Ports to the hosted models (chat, vision, speech, embeddings).

pub mod client;
pub mod types;

pub use client::{ChatModel, Embedder, SpeechSynthesizer, Transcriber, VisionModel};
pub use types::{ChatMessage, ChatRequest, ImageDetail, Role};
