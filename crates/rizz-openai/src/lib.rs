//! OpenAI adapter: chat completions, vision, transcription, speech and
//! embeddings behind the core model ports.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use rizz_core::{
    config::OpenAiConfig,
    errors::Error,
    model::{
        ChatModel, ChatRequest, Embedder, ImageDetail, SpeechSynthesizer, Transcriber, VisionModel,
    },
    Result,
};

const VISION_TEMPERATURE: f32 = 0.8;

#[derive(Clone, Debug)]
pub struct OpenAiClient {
    cfg: OpenAiConfig,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(cfg: OpenAiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.http_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::External(format!("openai client build error: {e}")))?;
        Ok(Self { cfg, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.cfg.base_url)
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<reqwest::Response> {
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.cfg.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::External(format!("openai request error: {e}")))?;
        check_status(resp, path).await
    }

    async fn completion(&self, body: Value) -> Result<String> {
        let resp = self.post_json("chat/completions", &body).await?;
        let parsed: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("openai json error: {e}")))?;
        first_choice_text(parsed)
    }
}

async fn check_status(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(Error::External(format!(
        "openai {what} failed: {status} {}",
        body.chars().take(200).collect::<String>()
    )))
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

fn first_choice_text(resp: ChatCompletionResponse) -> Result<String> {
    let text = resp
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(Error::External("openai returned an empty completion".to_string()));
    }
    Ok(text)
}

fn chat_body(req: &ChatRequest, default_model: &str) -> Value {
    let mut body = json!({
        "model": req.model.as_deref().unwrap_or(default_model),
        "messages": req.messages,
        "temperature": req.temperature,
    });
    if let Some(max) = req.max_tokens {
        body["max_tokens"] = json!(max);
    }
    body
}

fn vision_body(model: &str, jpeg: &[u8], prompt: &str, detail: ImageDetail, max_tokens: u32) -> Value {
    let b64 = base64::engine::general_purpose::STANDARD.encode(jpeg);
    json!({
        "model": model,
        "temperature": VISION_TEMPERATURE,
        "max_tokens": max_tokens,
        "messages": [{
            "role": "user",
            "content": [
                { "type": "text", "text": prompt },
                {
                    "type": "image_url",
                    "image_url": {
                        "url": format!("data:image/jpeg;base64,{b64}"),
                        "detail": detail.as_str(),
                    }
                }
            ]
        }]
    })
}

fn speech_body(model: &str, voice: &str, text: &str) -> Value {
    json!({
        "model": model,
        "voice": voice,
        "input": text,
        "response_format": "opus",
    })
}

fn embeddings_body(model: &str, texts: &[String]) -> Value {
    json!({ "model": model, "input": texts })
}

/// Vectors in input order regardless of the order the API lists them.
fn ordered_embeddings(resp: EmbeddingsResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut items = resp.data;
    items.sort_by_key(|i| i.index);
    if items.len() != expected {
        return Err(Error::External(format!(
            "openai returned {} embeddings for {expected} inputs",
            items.len()
        )));
    }
    Ok(items.into_iter().map(|i| i.embedding).collect())
}

fn audio_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("ogg" | "oga" | "opus") => "audio/ogg",
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("m4a" | "mp4") => "audio/mp4",
        Some("webm") => "audio/webm",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete(&self, req: ChatRequest) -> Result<String> {
        debug!(messages = req.messages.len(), "chat completion");
        self.completion(chat_body(&req, &self.cfg.chat_model)).await
    }
}

#[async_trait]
impl VisionModel for OpenAiClient {
    async fn describe_image(
        &self,
        jpeg: &[u8],
        prompt: &str,
        detail: ImageDetail,
        max_tokens: u32,
    ) -> Result<String> {
        debug!(bytes = jpeg.len(), detail = detail.as_str(), "vision request");
        self.completion(vision_body(&self.cfg.vision_model, jpeg, prompt, detail, max_tokens))
            .await
    }
}

#[async_trait]
impl Transcriber for OpenAiClient {
    async fn transcribe(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await.map_err(Error::Io)?;

        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("audio.ogg")
            .to_string();

        let form = reqwest::multipart::Form::new()
            .text("model", self.cfg.transcription_model.clone())
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes)
                    .file_name(file_name)
                    .mime_str(audio_mime(path))
                    .map_err(|e| Error::External(format!("openai multipart error: {e}")))?,
            );

        let resp = self
            .http
            .post(self.url("audio/transcriptions"))
            .bearer_auth(&self.cfg.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::External(format!("openai request error: {e}")))?;
        let resp = check_status(resp, "transcription").await?;

        let parsed: TranscriptionResponse = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("openai json error: {e}")))?;

        if parsed.text.trim().is_empty() {
            return Err(Error::External(
                "openai transcription returned empty text".to_string(),
            ));
        }
        Ok(parsed.text)
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let body = speech_body(&self.cfg.tts_model, &self.cfg.tts_voice, text);
        let resp = self.post_json("audio/speech", &body).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::External(format!("openai speech read error: {e}")))?;
        if bytes.is_empty() {
            return Err(Error::External("openai speech returned no audio".to_string()));
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = embeddings_body(&self.cfg.embedding_model, texts);
        let resp = self.post_json("embeddings", &body).await?;
        let parsed: EmbeddingsResponse = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("openai json error: {e}")))?;
        ordered_embeddings(parsed, texts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rizz_core::model::ChatMessage;

    #[test]
    fn chat_body_uses_override_model_and_roles() {
        let req = ChatRequest::new(
            vec![ChatMessage::system("persona"), ChatMessage::user("hi")],
            0.7,
        )
        .with_max_tokens(50)
        .with_model("gpt-4o");
        let body = chat_body(&req, "gpt-4o-mini");
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["max_tokens"], 50);

        let plain = chat_body(&ChatRequest::new(vec![], 0.2), "gpt-4o-mini");
        assert_eq!(plain["model"], "gpt-4o-mini");
        assert!(plain.get("max_tokens").is_none());
    }

    #[test]
    fn vision_body_embeds_data_url() {
        let body = vision_body("gpt-4o-mini", b"\xff\xd8", "describe", ImageDetail::High, 500);
        let image = &body["messages"][0]["content"][1]["image_url"];
        assert_eq!(image["url"], "data:image/jpeg;base64,/9g=");
        assert_eq!(image["detail"], "high");
        assert_eq!(body["max_tokens"], 500);
    }

    #[test]
    fn speech_requests_opus() {
        let body = speech_body("tts-1", "nova", "hey");
        assert_eq!(body["response_format"], "opus");
        assert_eq!(body["voice"], "nova");
    }

    #[test]
    fn embeddings_are_reordered_by_index() {
        let resp: EmbeddingsResponse = serde_json::from_str(
            r#"{"data":[{"index":1,"embedding":[0.5]},{"index":0,"embedding":[0.25]}]}"#,
        )
        .unwrap();
        assert_eq!(ordered_embeddings(resp, 2).unwrap(), vec![vec![0.25], vec![0.5]]);

        let short: EmbeddingsResponse =
            serde_json::from_str(r#"{"data":[{"index":0,"embedding":[1.0]}]}"#).unwrap();
        assert!(ordered_embeddings(short, 2).is_err());
    }

    #[test]
    fn empty_completion_is_an_error() {
        let resp: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert!(first_choice_text(resp).is_err());

        let resp: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"yo"}}]}"#).unwrap();
        assert_eq!(first_choice_text(resp).unwrap(), "yo");
    }

    #[test]
    fn mime_follows_extension() {
        assert_eq!(audio_mime(Path::new("/tmp/v.OGG")), "audio/ogg");
        assert_eq!(audio_mime(Path::new("/tmp/a.wav")), "audio/wav");
        assert_eq!(audio_mime(Path::new("/tmp/blob")), "application/octet-stream");
    }
}
