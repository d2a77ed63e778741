//! Model replies: either plain text or an "openers" bundle.

use serde::Deserialize;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Plain(String),
    /// A short comment followed by candidate messages the user can send as-is.
    Openers { comment: String, openers: Vec<String> },
}

impl Reply {
    /// Flatten into the text kept in conversation history.
    pub fn to_history_text(&self) -> String {
        match self {
            Reply::Plain(text) => text.clone(),
            Reply::Openers { comment, openers } => {
                let mut out = comment.clone();
                for opener in openers {
                    out.push_str("\n- ");
                    out.push_str(opener);
                }
                out
            }
        }
    }

    /// Flatten into one paragraph suitable for text-to-speech.
    pub fn to_spoken_text(&self) -> String {
        match self {
            Reply::Plain(text) => text.clone(),
            Reply::Openers { comment, openers } => {
                let mut parts = Vec::with_capacity(openers.len() + 1);
                if !comment.is_empty() {
                    parts.push(comment.as_str());
                }
                parts.extend(openers.iter().map(String::as_str));
                parts.join(" ... ")
            }
        }
    }
}

#[derive(Deserialize)]
struct OpenersPayload {
    #[serde(default)]
    comment: String,
    #[serde(default)]
    openers: Vec<String>,
}

/// Interpret raw model output.
///
/// A JSON object with `comment` and `openers` (optionally wrapped in a
/// ```json fence) becomes [`Reply::Openers`]; anything else, including JSON
/// that does not parse, is plain text.
pub fn parse_reply(raw: &str) -> Reply {
    let trimmed = raw.trim();
    let body = strip_code_fence(trimmed).unwrap_or(trimmed);

    if body.starts_with('{') {
        if let Ok(payload) = serde_json::from_str::<OpenersPayload>(body) {
            let openers: Vec<String> = payload
                .openers
                .into_iter()
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
            let comment = payload.comment.trim().to_string();
            if !openers.is_empty() || !comment.is_empty() {
                return Reply::Openers { comment, openers };
            }
        }
    }

    Reply::Plain(trimmed.to_string())
}

fn strip_code_fence(s: &str) -> Option<&str> {
    let rest = s.strip_prefix("```")?;
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```")?;
    Some(rest.trim())
}
