//! The dating coach: prompt assembly, model calls, conversation memory and
//! style matching.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use tracing::{debug, info};

use crate::{
    domain::UserId,
    history::ChatHistory,
    model::{ChatMessage, ChatModel, ChatRequest, ImageDetail, VisionModel},
    reply::{parse_reply, Reply},
    style::{split_suggestion, StyleStore},
    users::{age_on, UserProfile, UserStore},
    Result,
};

const PERSONA: &str = r#"You are "The Rizzard", a dating coach who texts like a close friend. You are confident, playful and direct, and the user trusts you as a mentor.

How you write:
- Short, casual sentences, the way a friend texts. Emojis are fine when they fit.
- No intros, no disclaimers, no explaining your suggestions. Go straight to the advice.
- Mirror the user's register: if they write formally or without slang, keep it clean.
- Give concrete lines to send as well as real-life dating advice.
- Use the user's name now and then. Build on what worked or failed before.
- If the profile lists a zodiac sign, let it flavour your advice.

Message tags you will see:
- [LANGUAGE: xx] always answer in that language.
- [IMAGE ANALYSIS] a description of a picture the user sent (profile, chat screenshot, photo).
- [USER MESSAGE] what the user wrote along with that picture.
- [CONFIG UPDATE] the user changed their profile; take it into account from now on.
- [VOICE] your answer will be read aloud.

When the user sends a dating profile or photo without a specific question, assume they want openers.
When they send a conversation, suggest what to say next.
In both cases answer ONLY with a JSON object, no code fence:
{"comment": "<one short line of commentary>", "openers": ["<line 1>", "<line 2>", "<line 3>", "<line 4>", "<line 5>"]}
Openers are short, easy to send and never cheesy unless asked. A simple question or a playful observation beats a pickup line.
For everything else, answer in plain text."#;

const VOICE_INSTRUCTION: &str = "[VOICE] Answer in two to four short spoken sentences. No JSON, no lists, no emojis.";

const DESCRIBE_PROMPT: &str = "What does this image show in the context of a dating profile or a chat conversation? \
Describe the visible text, people and details. If it is a conversation, transcribe it. Answer in plain text, not markdown.";

const EXTRACT_PROMPT: &str = "Extract the conversation from this screenshot as plain dialogue lines. \
Keep only the messages on the right-hand side that share the same bubble colour. Do not add names or anything else.";

const SUMMARIZE_FRAMES_PROMPT: &str =
    "These are descriptions of frames sampled from one video, in order. Summarize what happens in the video in a few sentences.";

const DESCRIBE_MAX_TOKENS: u32 = 300;
const EXTRACT_MAX_TOKENS: u32 = 500;
const SUMMARY_TEMPERATURE: f32 = 0.8;
const STYLE_TEMPERATURE: f32 = 0.7;
const STYLE_EXAMPLES: usize = 2;

#[derive(Clone, Debug)]
pub struct CoachSettings {
    pub temperature: f32,
    /// Model used for frame summaries and style rewrites; the chat default when `None`.
    pub summary_model: Option<String>,
}

impl Default for CoachSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            summary_model: None,
        }
    }
}

pub struct Coach {
    chat: Arc<dyn ChatModel>,
    vision: Arc<dyn VisionModel>,
    users: Arc<UserStore>,
    history: Arc<ChatHistory>,
    styles: Arc<StyleStore>,
    settings: CoachSettings,
}

impl Coach {
    pub fn new(
        chat: Arc<dyn ChatModel>,
        vision: Arc<dyn VisionModel>,
        users: Arc<UserStore>,
        history: Arc<ChatHistory>,
        styles: Arc<StyleStore>,
        settings: CoachSettings,
    ) -> Self {
        Self {
            chat,
            vision,
            users,
            history,
            styles,
            settings,
        }
    }

    pub fn users(&self) -> &Arc<UserStore> {
        &self.users
    }

    pub async fn reply_to_text(&self, user_id: UserId, text: &str) -> Result<Reply> {
        self.converse(user_id, text, None).await
    }

    pub async fn reply_to_image(
        &self,
        user_id: UserId,
        description: &str,
        caption: Option<&str>,
    ) -> Result<Reply> {
        let mut question = format!("[IMAGE ANALYSIS] {description}");
        if let Some(caption) = caption.map(str::trim).filter(|c| !c.is_empty()) {
            question.push_str("\n[USER MESSAGE] ");
            question.push_str(caption);
        }
        self.converse(user_id, &question, None).await
    }

    /// Spoken-style answer to a transcribed voice note.
    pub async fn reply_to_voice(&self, user_id: UserId, transcript: &str) -> Result<String> {
        let reply = self
            .converse(user_id, transcript, Some(VOICE_INSTRUCTION))
            .await?;
        Ok(reply.to_spoken_text())
    }

    /// Spoken-style answer to a video, given what was seen and heard.
    pub async fn reply_to_video(
        &self,
        user_id: UserId,
        visual_summary: &str,
        transcript: &str,
    ) -> Result<String> {
        let transcript = if transcript.trim().is_empty() {
            "(no speech)"
        } else {
            transcript
        };
        let question = format!(
            "The user sent a video. React as if you watched and heard it yourself.\n\
             What you see: {visual_summary}\n\
             What you hear: {transcript}\n\
             Comment on it like a witty mentor and ask an open question to keep the chat going."
        );
        let reply = self
            .converse(user_id, &question, Some(VOICE_INSTRUCTION))
            .await?;
        Ok(reply.to_spoken_text())
    }

    pub async fn describe_image(&self, jpeg: &[u8]) -> Result<String> {
        self.vision
            .describe_image(jpeg, DESCRIBE_PROMPT, ImageDetail::Low, DESCRIBE_MAX_TOKENS)
            .await
    }

    /// Read the user's own side of a chat screenshot.
    pub async fn extract_conversation(&self, jpeg: &[u8]) -> Result<String> {
        self.vision
            .describe_image(jpeg, EXTRACT_PROMPT, ImageDetail::High, EXTRACT_MAX_TOKENS)
            .await
    }

    pub async fn summarize_frames(&self, descriptions: &[String]) -> Result<String> {
        let listing = descriptions
            .iter()
            .enumerate()
            .map(|(i, d)| format!("Frame {}: {d}", i + 1))
            .collect::<Vec<_>>()
            .join("\n");
        let req = self.auxiliary_request(vec![
            ChatMessage::system(SUMMARIZE_FRAMES_PROMPT),
            ChatMessage::user(listing),
        ], SUMMARY_TEMPERATURE);
        self.chat.complete(req).await
    }

    /// Learn from a screenshot of the user's past conversations.
    /// Returns the number of style chunks stored.
    pub async fn learn_style(&self, user_id: UserId, jpeg: &[u8]) -> Result<usize> {
        let dialogue = self.extract_conversation(jpeg).await?;
        let added = self.styles.learn(user_id, &dialogue).await?;
        info!(user_id = user_id.0, added, "learned conversation style");
        Ok(added)
    }

    /// Tell the model about a profile change on its next turn.
    pub async fn note_config_update(&self, user_id: UserId, note: &str) {
        self.history.note_config_update(user_id, note).await;
    }

    async fn converse(
        &self,
        user_id: UserId,
        question: &str,
        instruction: Option<&str>,
    ) -> Result<Reply> {
        let profile = self
            .users
            .get(user_id)
            .await
            .unwrap_or_else(|| UserProfile::new(user_id));
        let tagged = format!("[LANGUAGE: {}] {question}", profile.language.code());

        let mut messages = vec![
            ChatMessage::system(PERSONA),
            ChatMessage::system(profile_context(&profile, Utc::now().date_naive())),
        ];
        messages.extend(self.history.recent(user_id).await);
        if let Some(instruction) = instruction {
            messages.push(ChatMessage::system(instruction));
        }
        messages.push(ChatMessage::user(tagged.clone()));

        let raw = self
            .chat
            .complete(ChatRequest::new(messages, self.settings.temperature))
            .await?;
        let answer = self.enhance_style(user_id, &raw).await?;
        let reply = parse_reply(&answer);

        self.history
            .append(
                user_id,
                [ChatMessage::user(tagged), ChatMessage::assistant(reply.to_history_text())],
            )
            .await;
        Ok(reply)
    }

    /// Rewrite the part after "you should say" so it sounds like the user.
    async fn enhance_style(&self, user_id: UserId, response: &str) -> Result<String> {
        let Some(parts) = split_suggestion(response) else {
            return Ok(response.to_string());
        };
        if !self.styles.has_examples(user_id).await {
            return Ok(response.to_string());
        }

        let examples = self
            .styles
            .similar(user_id, parts.suggestion, STYLE_EXAMPLES)
            .await?
            .join("\n");
        let prompt = format!(
            "These messages show how the user writes:\n{examples}\n\n\
             Rewrite this message in their style: {}\n\n\
             Keep the meaning. Match their tone, vocabulary and punctuation. Answer with the rewritten message only.",
            parts.suggestion.trim()
        );
        let styled = self
            .chat
            .complete(self.auxiliary_request(vec![ChatMessage::user(prompt)], STYLE_TEMPERATURE))
            .await?;
        debug!(user_id = user_id.0, "applied user style to suggestion");
        Ok(format!("{}{} {}", parts.context, parts.marker, styled.trim()))
    }

    fn auxiliary_request(&self, messages: Vec<ChatMessage>, temperature: f32) -> ChatRequest {
        let req = ChatRequest::new(messages, temperature);
        match &self.settings.summary_model {
            Some(model) => req.with_model(model.clone()),
            None => req,
        }
    }
}

/// One system line describing the user, so advice can be personal.
pub fn profile_context(profile: &UserProfile, today: NaiveDate) -> String {
    let mut facts = Vec::new();
    if let Some(name) = &profile.name {
        facts.push(format!("name: {name}"));
    }
    if let Some(gender) = profile.gender {
        facts.push(format!("gender: {}", gender.code()));
    }
    if let Some(pref) = profile.sexual_preference {
        facts.push(format!("sexual preference: {}", pref.code()));
    }
    if let Some(birthdate) = profile.birthdate {
        facts.push(format!("age: {}", age_on(birthdate, today)));
        facts.push(format!("zodiac sign: {}", zodiac_sign(birthdate)));
    }
    facts.push(format!("language: {}", profile.language.code()));
    format!("User profile. {}.", facts.join("; "))
}

pub fn zodiac_sign(date: NaiveDate) -> &'static str {
    // Per month: the day the second sign starts, the sign before it, the sign from it on.
    const SIGNS: [(u32, &str, &str); 12] = [
        (20, "Capricorn", "Aquarius"),
        (19, "Aquarius", "Pisces"),
        (21, "Pisces", "Aries"),
        (20, "Aries", "Taurus"),
        (21, "Taurus", "Gemini"),
        (21, "Gemini", "Cancer"),
        (23, "Cancer", "Leo"),
        (23, "Leo", "Virgo"),
        (23, "Virgo", "Libra"),
        (23, "Libra", "Scorpio"),
        (22, "Scorpio", "Sagittarius"),
        (22, "Sagittarius", "Capricorn"),
    ];
    let (cutoff, before, after) = SIGNS[date.month0() as usize];
    if date.day() < cutoff {
        before
    } else {
        after
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        errors::Error,
        i18n::Language,
        model::{Embedder, Role},
        style::tests::KeywordEmbedder,
        users::{Gender, Preference},
    };
    use async_trait::async_trait;
    use std::{collections::VecDeque, sync::Mutex};

    /// Returns scripted answers in order and records every request.
    #[derive(Default)]
    pub(crate) struct ScriptedChat {
        pub answers: Mutex<VecDeque<String>>,
        pub requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedChat {
        pub fn with(answers: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedChat {
        async fn complete(&self, req: ChatRequest) -> Result<String> {
            self.requests.lock().unwrap().push(req);
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| Error::External("no scripted answer left".to_string()))
        }
    }

    #[derive(Default)]
    pub(crate) struct FixedVision {
        pub answer: String,
        pub calls: Mutex<Vec<(ImageDetail, u32)>>,
    }

    #[async_trait]
    impl VisionModel for FixedVision {
        async fn describe_image(
            &self,
            _jpeg: &[u8],
            _prompt: &str,
            detail: ImageDetail,
            max_tokens: u32,
        ) -> Result<String> {
            self.calls.lock().unwrap().push((detail, max_tokens));
            Ok(self.answer.clone())
        }
    }

    pub(crate) fn coach_with(
        chat: Arc<ScriptedChat>,
        vision: Arc<FixedVision>,
        users: Arc<UserStore>,
    ) -> (Coach, Arc<ChatHistory>, Arc<StyleStore>) {
        let history = Arc::new(ChatHistory::new(20));
        let embedder: Arc<dyn Embedder> = Arc::new(KeywordEmbedder);
        let styles = Arc::new(StyleStore::in_memory(embedder));
        let coach = Coach::new(
            chat,
            vision,
            users,
            history.clone(),
            styles.clone(),
            CoachSettings::default(),
        );
        (coach, history, styles)
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn zodiac_boundaries() {
        assert_eq!(zodiac_sign(d(1990, 1, 19)), "Capricorn");
        assert_eq!(zodiac_sign(d(1990, 1, 20)), "Aquarius");
        assert_eq!(zodiac_sign(d(1990, 3, 21)), "Aries");
        assert_eq!(zodiac_sign(d(1990, 12, 31)), "Capricorn");
    }

    #[test]
    fn profile_context_lists_known_facts() {
        let mut p = UserProfile::new(UserId(1));
        p.name = Some("Sam".to_string());
        p.gender = Some(Gender::Male);
        p.sexual_preference = Some(Preference::Bisexual);
        p.birthdate = Some(d(1995, 3, 7));
        p.language = Language::Fr;
        let ctx = profile_context(&p, d(2024, 6, 1));
        assert_eq!(
            ctx,
            "User profile. name: Sam; gender: male; sexual preference: bisexual; age: 29; zodiac sign: Pisces; language: fr."
        );
    }

    #[tokio::test]
    async fn text_reply_uses_history_and_language_tag() {
        let chat = ScriptedChat::with(&["first answer", "second answer"]);
        let users = Arc::new(UserStore::in_memory());
        users.update(UserId(1), |p| p.language = Language::Fr).await.unwrap();
        let (coach, history, _) = coach_with(chat.clone(), Arc::default(), users);

        coach.reply_to_text(UserId(1), "salut").await.unwrap();
        let reply = coach.reply_to_text(UserId(1), "et après ?").await.unwrap();
        assert_eq!(reply, Reply::Plain("second answer".to_string()));

        let requests = chat.requests.lock().unwrap();
        let last = &requests[1].messages;
        assert_eq!(last[0].role, Role::System);
        assert_eq!(last.last().unwrap().content, "[LANGUAGE: fr] et après ?");
        assert!(last.iter().any(|m| m.role == Role::Assistant && m.content == "first answer"));
        assert_eq!(history.recent(UserId(1)).await.len(), 4);
    }

    #[tokio::test]
    async fn image_reply_tags_description_and_caption() {
        let chat = ScriptedChat::with(&[r#"{"comment":"Cute","openers":["Hi"]}"#]);
        let (coach, history, _) = coach_with(chat.clone(), Arc::default(), Arc::new(UserStore::in_memory()));

        let reply = coach
            .reply_to_image(UserId(2), "a profile with a dog", Some("what do I say?"))
            .await
            .unwrap();
        assert!(matches!(reply, Reply::Openers { .. }));

        // Memory keeps the readable form, not the raw JSON.
        let remembered = history.recent(UserId(2)).await;
        assert_eq!(remembered[1].role, Role::Assistant);
        assert_eq!(remembered[1].content, "Cute\n- Hi");

        let requests = chat.requests.lock().unwrap();
        let question = &requests[0].messages.last().unwrap().content;
        assert_eq!(
            question,
            "[LANGUAGE: en] [IMAGE ANALYSIS] a profile with a dog\n[USER MESSAGE] what do I say?"
        );
    }

    #[tokio::test]
    async fn suggestion_is_rewritten_in_user_style() {
        let chat = ScriptedChat::with(&["Easy, you should say: want to grab coffee?", "coffee?? u free"]);
        let (coach, _, styles) = coach_with(chat.clone(), Arc::default(), Arc::new(UserStore::in_memory()));
        styles.learn(UserId(3), "coffee later?? lol").await.unwrap();

        let reply = coach.reply_to_text(UserId(3), "what now").await.unwrap();
        assert_eq!(reply, Reply::Plain("Easy, you should say coffee?? u free".to_string()));

        let requests = chat.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].messages[0].content.contains("coffee later?? lol"));
    }

    #[tokio::test]
    async fn no_rewrite_without_style_examples() {
        let chat = ScriptedChat::with(&["You should say hi"]);
        let (coach, _, _) = coach_with(chat.clone(), Arc::default(), Arc::new(UserStore::in_memory()));
        let reply = coach.reply_to_text(UserId(4), "help").await.unwrap();
        assert_eq!(reply, Reply::Plain("You should say hi".to_string()));
        assert_eq!(chat.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn voice_reply_is_flattened_for_speech() {
        let chat = ScriptedChat::with(&[r#"{"comment":"Try","openers":["a","b"]}"#]);
        let (coach, _, _) = coach_with(chat.clone(), Arc::default(), Arc::new(UserStore::in_memory()));
        let spoken = coach.reply_to_voice(UserId(5), "she left me on read").await.unwrap();
        assert_eq!(spoken, "Try ... a ... b");

        let requests = chat.requests.lock().unwrap();
        assert!(requests[0].messages.iter().any(|m| m.content.starts_with("[VOICE]")));
    }

    #[tokio::test]
    async fn learning_style_reads_screenshot_at_high_detail() {
        let vision = Arc::new(FixedVision {
            answer: "dog walk tomorrow?\nhaha ok".to_string(),
            ..Default::default()
        });
        let (coach, _, styles) = coach_with(ScriptedChat::with(&[]), vision.clone(), Arc::new(UserStore::in_memory()));

        let added = coach.learn_style(UserId(6), b"jpeg").await.unwrap();
        assert_eq!(added, 1);
        assert!(styles.has_examples(UserId(6)).await);
        assert_eq!(vision.calls.lock().unwrap()[0], (ImageDetail::High, 500));

        coach.describe_image(b"jpeg").await.unwrap();
        assert_eq!(vision.calls.lock().unwrap()[1], (ImageDetail::Low, 300));
    }

    #[tokio::test]
    async fn frame_summary_numbers_frames() {
        let chat = ScriptedChat::with(&["a beach walk"]);
        let (coach, _, _) = coach_with(chat.clone(), Arc::default(), Arc::new(UserStore::in_memory()));
        let summary = coach
            .summarize_frames(&["sand".to_string(), "waves".to_string()])
            .await
            .unwrap();
        assert_eq!(summary, "a beach walk");
        let requests = chat.requests.lock().unwrap();
        assert_eq!(requests[0].messages[1].content, "Frame 1: sand\nFrame 2: waves");
    }

    #[tokio::test]
    async fn config_notes_do_not_call_the_model() {
        let chat = ScriptedChat::with(&[]);
        let (coach, history, _) = coach_with(chat.clone(), Arc::default(), Arc::new(UserStore::in_memory()));
        coach.note_config_update(UserId(7), "User has set their name to Léa.").await;
        assert!(chat.requests.lock().unwrap().is_empty());
        assert_eq!(history.recent(UserId(7)).await.len(), 1);
    }
}
