use std::path::Path;

use async_trait::async_trait;

use crate::Result;

use super::types::*;

/// Text completion.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, req: ChatRequest) -> Result<String>;
}

/// Image understanding. `jpeg` is the raw image bytes.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn describe_image(
        &self,
        jpeg: &[u8],
        prompt: &str,
        detail: ImageDetail,
        max_tokens: u32,
    ) -> Result<String>;
}

/// Speech to text for a local audio file.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, path: &Path) -> Result<String>;
}

/// Text to speech; returns an OGG/Opus voice note.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input, same order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
