//! First-run setup and `/settings`.
//!
//! Setup walks a new user through language, name, birthdate, gender and
//! preference. The same callbacks edit a single field once setup is done.
//! Every profile change is also noted in the conversation history so the
//! coach picks it up.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use crate::{
    coach::Coach,
    domain::UserId,
    i18n::{render, text, Language, MessageKey, BIRTHDATE_FORMAT},
    messaging::{InlineButton, InlineKeyboard},
    users::{age_on, parse_birthdate, AwaitingInput, Gender, OnboardingStep, Preference, UserProfile, UserStore},
    Result,
};

/// What to show the user: text plus an optional keyboard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotReply {
    pub text: String,
    pub keyboard: Option<InlineKeyboard>,
}

impl BotReply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    fn with_keyboard(text: impl Into<String>, keyboard: InlineKeyboard) -> Self {
        Self {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigField {
    Name,
    Birthdate,
    Gender,
    SexualPreference,
    Language,
    Style,
}

/// Parsed inline-button payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Callback {
    Config(ConfigField),
    SetLanguage(Language),
    SetGender(Gender),
    SetPreference(Preference),
}

pub fn parse_callback(data: &str) -> Option<Callback> {
    if let Some(field) = data.strip_prefix("config_") {
        let field = match field {
            "name" => ConfigField::Name,
            "birthdate" => ConfigField::Birthdate,
            "gender" => ConfigField::Gender,
            "sexual_preference" => ConfigField::SexualPreference,
            "language" => ConfigField::Language,
            "style" => ConfigField::Style,
            _ => return None,
        };
        return Some(Callback::Config(field));
    }
    if let Some(code) = data.strip_prefix("set_language_") {
        return Language::ALL
            .into_iter()
            .find(|l| l.code() == code)
            .map(Callback::SetLanguage);
    }
    if let Some(code) = data.strip_prefix("set_gender_") {
        return Gender::from_code(code).map(Callback::SetGender);
    }
    if let Some(code) = data.strip_prefix("set_preference_") {
        return Preference::from_code(code).map(Callback::SetPreference);
    }
    None
}

pub fn language_keyboard() -> InlineKeyboard {
    InlineKeyboard::new(vec![vec![
        InlineButton::new("English 🇬🇧", "set_language_en"),
        InlineButton::new("Français 🇫🇷", "set_language_fr"),
    ]])
}

pub fn gender_keyboard(lang: Language) -> InlineKeyboard {
    InlineKeyboard::new(vec![vec![
        InlineButton::new(text(lang, MessageKey::Male), "set_gender_male"),
        InlineButton::new(text(lang, MessageKey::Female), "set_gender_female"),
    ]])
}

pub fn preference_keyboard(lang: Language) -> InlineKeyboard {
    let buttons = [Preference::Heterosexual, Preference::Homosexual, Preference::Bisexual]
        .into_iter()
        .map(|p| InlineButton::new(text(lang, p.label_key()), format!("set_preference_{}", p.code())))
        .collect();
    InlineKeyboard::grid(buttons, 2)
}

pub fn settings_keyboard(lang: Language) -> InlineKeyboard {
    InlineKeyboard::one_per_row(vec![
        InlineButton::new(text(lang, MessageKey::Name), "config_name"),
        InlineButton::new(text(lang, MessageKey::Birthdate), "config_birthdate"),
        InlineButton::new(text(lang, MessageKey::Gender), "config_gender"),
        InlineButton::new(text(lang, MessageKey::SexualPreference), "config_sexual_preference"),
        InlineButton::new(text(lang, MessageKey::LanguageLabel), "config_language"),
        InlineButton::new(text(lang, MessageKey::UploadStyle), "config_style"),
    ])
}

fn step_prompt(step: OnboardingStep, lang: Language) -> BotReply {
    match step {
        OnboardingStep::Language => {
            BotReply::with_keyboard(text(lang, MessageKey::ChooseLanguage), language_keyboard())
        }
        OnboardingStep::Name => BotReply::text(text(lang, MessageKey::AskName)),
        OnboardingStep::Birthdate => BotReply::text(render(
            lang,
            MessageKey::AskBirthdate,
            &[("format", BIRTHDATE_FORMAT)],
        )),
        OnboardingStep::Gender => {
            BotReply::with_keyboard(text(lang, MessageKey::AskGender), gender_keyboard(lang))
        }
        OnboardingStep::Preference => BotReply::with_keyboard(
            text(lang, MessageKey::AskPreference),
            preference_keyboard(lang),
        ),
    }
}

fn invalid_birthdate(lang: Language) -> BotReply {
    BotReply::text(render(
        lang,
        MessageKey::InvalidBirthdate,
        &[("format", BIRTHDATE_FORMAT)],
    ))
}

fn format_birthdate(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

pub fn settings_summary(profile: &UserProfile, today: NaiveDate) -> String {
    let lang = profile.language;
    let unset = "-";
    let gender = profile.gender.map(|g| text(lang, g.label_key())).unwrap_or(unset);
    let preference = profile
        .sexual_preference
        .map(|p| text(lang, p.label_key()))
        .unwrap_or(unset);
    let age = profile
        .birthdate
        .map(|b| age_on(b, today).to_string())
        .unwrap_or_else(|| unset.to_string());
    render(
        lang,
        MessageKey::SettingsSummary,
        &[
            ("name", profile.name.as_deref().unwrap_or(unset)),
            ("gender", gender),
            ("preference", preference),
            ("language", lang.display_name()),
            ("age", &age),
        ],
    )
}

pub struct Onboarding {
    users: Arc<UserStore>,
    coach: Arc<Coach>,
}

impl Onboarding {
    pub fn new(users: Arc<UserStore>, coach: Arc<Coach>) -> Self {
        Self { users, coach }
    }

    /// `/start`.
    pub async fn start(
        &self,
        user_id: UserId,
        first_name: &str,
        username: Option<&str>,
    ) -> Result<BotReply> {
        if let Some(profile) = self.users.get(user_id).await {
            if !profile.is_onboarding() {
                let name = profile.name.as_deref().unwrap_or(first_name);
                return Ok(BotReply::text(render(
                    profile.language,
                    MessageKey::WelcomeBack,
                    &[("name", name)],
                )));
            }
        }

        let first_name = first_name.trim();
        let profile = self
            .users
            .update(user_id, |p| {
                if !first_name.is_empty() {
                    p.name = Some(first_name.to_string());
                }
                p.username = username.map(str::to_string);
                p.onboarding = Some(OnboardingStep::Language);
                p.awaiting_input = None;
            })
            .await?;
        info!(user_id = user_id.0, "started onboarding");
        Ok(step_prompt(OnboardingStep::Language, profile.language))
    }

    /// `/settings`. Users still in setup get their current step instead.
    pub async fn settings(&self, user_id: UserId) -> BotReply {
        let profile = self
            .users
            .get(user_id)
            .await
            .unwrap_or_else(|| UserProfile::new(user_id));
        if let Some(step) = profile.onboarding {
            return step_prompt(step, profile.language);
        }
        BotReply::with_keyboard(
            text(profile.language, MessageKey::SettingsPrompt),
            settings_keyboard(profile.language),
        )
    }

    /// Consume a text message that answers a setup or settings question.
    /// `None` means the text is a normal message for the coach.
    pub async fn handle_text(
        &self,
        user_id: UserId,
        input: &str,
        today: NaiveDate,
    ) -> Result<Option<BotReply>> {
        let Some(profile) = self.users.get(user_id).await else {
            return Ok(None);
        };
        let lang = profile.language;
        let input = input.trim();

        if let Some(step) = profile.onboarding {
            let reply = match step {
                OnboardingStep::Name if !input.is_empty() => {
                    self.users
                        .update(user_id, |p| {
                            p.name = Some(input.to_string());
                            p.onboarding = Some(OnboardingStep::Birthdate);
                        })
                        .await?;
                    self.note(user_id, format!("User has set their name to {input}.")).await;
                    step_prompt(OnboardingStep::Birthdate, lang)
                }
                OnboardingStep::Birthdate => match parse_birthdate(input, today) {
                    Ok(date) => {
                        self.users
                            .update(user_id, |p| {
                                p.birthdate = Some(date);
                                p.onboarding = Some(OnboardingStep::Gender);
                            })
                            .await?;
                        self.note(
                            user_id,
                            format!("User was born on {}.", format_birthdate(date)),
                        )
                        .await;
                        step_prompt(OnboardingStep::Gender, lang)
                    }
                    Err(_) => invalid_birthdate(lang),
                },
                // Button steps: show the buttons again.
                other => step_prompt(other, lang),
            };
            return Ok(Some(reply));
        }

        match profile.awaiting_input {
            None => Ok(None),
            Some(AwaitingInput::Name) => {
                if input.is_empty() {
                    return Ok(Some(BotReply::text(text(lang, MessageKey::AskNameSettings))));
                }
                self.users
                    .update(user_id, |p| {
                        p.name = Some(input.to_string());
                        p.awaiting_input = None;
                    })
                    .await?;
                self.note(user_id, format!("User has set their name to {input}.")).await;
                Ok(Some(config_updated(lang, MessageKey::Name, input)))
            }
            Some(AwaitingInput::Birthdate) => match parse_birthdate(input, today) {
                Ok(date) => {
                    self.users
                        .update(user_id, |p| {
                            p.birthdate = Some(date);
                            p.awaiting_input = None;
                        })
                        .await?;
                    let formatted = format_birthdate(date);
                    self.note(user_id, format!("User was born on {formatted}.")).await;
                    Ok(Some(config_updated(lang, MessageKey::Birthdate, &formatted)))
                }
                Err(_) => Ok(Some(invalid_birthdate(lang))),
            },
        }
    }

    /// Handle an inline-button press. `None` for payloads this flow does not own.
    pub async fn handle_callback(
        &self,
        user_id: UserId,
        data: &str,
        today: NaiveDate,
    ) -> Result<Option<BotReply>> {
        let Some(callback) = parse_callback(data) else {
            return Ok(None);
        };
        let profile = self
            .users
            .get(user_id)
            .await
            .unwrap_or_else(|| UserProfile::new(user_id));
        let lang = profile.language;

        let reply = match callback {
            Callback::Config(field) => self.open_field(user_id, field, lang).await?,
            Callback::SetLanguage(language) => {
                let updated = self
                    .users
                    .update(user_id, |p| {
                        p.language = language;
                        if p.onboarding == Some(OnboardingStep::Language) {
                            p.onboarding = Some(OnboardingStep::Name);
                        }
                    })
                    .await?;
                let code = language.code();
                self.note(
                    user_id,
                    format!("User has changed their language preference to {code}. Respond in {code} from now on."),
                )
                .await;
                match updated.onboarding {
                    Some(step) => step_prompt(step, language),
                    None => config_updated(language, MessageKey::LanguageLabel, &code.to_uppercase()),
                }
            }
            Callback::SetGender(gender) => {
                let updated = self
                    .users
                    .update(user_id, |p| {
                        p.gender = Some(gender);
                        if p.onboarding == Some(OnboardingStep::Gender) {
                            p.onboarding = Some(OnboardingStep::Preference);
                        }
                    })
                    .await?;
                self.note(user_id, format!("User has identified as {}.", gender.code())).await;
                match updated.onboarding {
                    Some(step) => step_prompt(step, lang),
                    None => BotReply::text(render(
                        lang,
                        MessageKey::GenderUpdated,
                        &[("gender", text(lang, gender.label_key()))],
                    )),
                }
            }
            Callback::SetPreference(pref) => {
                let finishing = profile.onboarding == Some(OnboardingStep::Preference);
                let updated = self
                    .users
                    .update(user_id, |p| {
                        p.sexual_preference = Some(pref);
                        if finishing {
                            p.onboarding = None;
                        }
                    })
                    .await?;
                self.note(
                    user_id,
                    format!("User has set their sexual preference to {}.", pref.code()),
                )
                .await;
                if finishing {
                    info!(user_id = user_id.0, "completed onboarding");
                    BotReply::text(settings_summary(&updated, today))
                } else if let Some(step) = updated.onboarding {
                    step_prompt(step, lang)
                } else {
                    BotReply::text(render(
                        lang,
                        MessageKey::PreferenceUpdated,
                        &[("preference", text(lang, pref.label_key()))],
                    ))
                }
            }
        };
        Ok(Some(reply))
    }

    async fn open_field(&self, user_id: UserId, field: ConfigField, lang: Language) -> Result<BotReply> {
        let reply = match field {
            ConfigField::Name => {
                self.users
                    .update(user_id, |p| p.awaiting_input = Some(AwaitingInput::Name))
                    .await?;
                BotReply::text(text(lang, MessageKey::AskNameSettings))
            }
            ConfigField::Birthdate => {
                self.users
                    .update(user_id, |p| p.awaiting_input = Some(AwaitingInput::Birthdate))
                    .await?;
                step_prompt(OnboardingStep::Birthdate, lang)
            }
            ConfigField::Gender => step_prompt(OnboardingStep::Gender, lang),
            ConfigField::SexualPreference => step_prompt(OnboardingStep::Preference, lang),
            ConfigField::Language => {
                BotReply::with_keyboard(text(lang, MessageKey::LanguageLabel), language_keyboard())
            }
            ConfigField::Style => BotReply::text(text(lang, MessageKey::StyleInstructions)),
        };
        Ok(reply)
    }

    async fn note(&self, user_id: UserId, note: String) {
        self.coach.note_config_update(user_id, &note).await;
    }
}

fn config_updated(lang: Language, field: MessageKey, value: &str) -> BotReply {
    BotReply::text(render(
        lang,
        MessageKey::ConfigType,
        &[("config_type", text(lang, field)), ("value", value)],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coach::tests::{coach_with, ScriptedChat};
    use crate::history::ChatHistory;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn setup() -> (Onboarding, Arc<UserStore>, Arc<ChatHistory>) {
        let users = Arc::new(UserStore::in_memory());
        let (coach, history, _) = coach_with(ScriptedChat::with(&[]), Arc::default(), users.clone());
        (Onboarding::new(users.clone(), Arc::new(coach)), users, history)
    }

    fn callbacks(reply: &BotReply) -> Vec<String> {
        reply
            .keyboard
            .as_ref()
            .map(|k| k.buttons().map(|b| b.callback_data.clone()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn callback_payloads_parse_strictly() {
        assert_eq!(parse_callback("config_sexual_preference"), Some(Callback::Config(ConfigField::SexualPreference)));
        assert_eq!(parse_callback("set_language_fr"), Some(Callback::SetLanguage(Language::Fr)));
        assert_eq!(parse_callback("set_gender_female"), Some(Callback::SetGender(Gender::Female)));
        assert_eq!(parse_callback("set_preference_bisexual"), Some(Callback::SetPreference(Preference::Bisexual)));
        assert_eq!(parse_callback("set_language_de"), None);
        assert_eq!(parse_callback("config_sexual"), None);
        assert_eq!(parse_callback("premium"), None);
    }

    #[tokio::test]
    async fn full_setup_flow() {
        let (flow, users, history) = setup();
        let u = UserId(10);

        let r = flow.start(u, "Sam", Some("sam99")).await.unwrap();
        assert_eq!(callbacks(&r), vec!["set_language_en", "set_language_fr"]);

        let r = flow.handle_callback(u, "set_language_fr", today()).await.unwrap().unwrap();
        assert_eq!(r.text, "Super ! Comment tu t'appelles ?");

        let r = flow.handle_text(u, "Samuel", today()).await.unwrap().unwrap();
        assert!(r.text.contains("DD/MM/YYYY"));

        let r = flow.handle_text(u, "31/02/1990", today()).await.unwrap().unwrap();
        assert!(r.text.starts_with("Format de date invalide"));
        assert_eq!(users.get(u).await.unwrap().onboarding, Some(OnboardingStep::Birthdate));

        let r = flow.handle_text(u, "07/03/1995", today()).await.unwrap().unwrap();
        assert_eq!(callbacks(&r), vec!["set_gender_male", "set_gender_female"]);

        let r = flow.handle_callback(u, "set_gender_male", today()).await.unwrap().unwrap();
        assert_eq!(r.keyboard.as_ref().unwrap().rows.len(), 2);

        let r = flow.handle_callback(u, "set_preference_heterosexual", today()).await.unwrap().unwrap();
        assert!(r.text.contains("Nom : Samuel"));
        assert!(r.text.contains("Age : 29"));
        assert!(r.text.contains("Langue : Français"));

        let profile = users.get(u).await.unwrap();
        assert_eq!(profile.onboarding, None);
        assert_eq!(profile.username.as_deref(), Some("sam99"));

        let notes = history.recent(u).await;
        assert_eq!(notes.len(), 5);
        assert!(notes.iter().all(|m| m.content.starts_with("[CONFIG UPDATE]")));

        // Setup done: normal text goes to the coach.
        assert!(flow.handle_text(u, "help me", today()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn start_for_configured_user_says_welcome_back() {
        let (flow, users, _) = setup();
        users
            .update(UserId(11), |p| p.name = Some("Léa".to_string()))
            .await
            .unwrap();
        let r = flow.start(UserId(11), "Lea", None).await.unwrap();
        assert!(r.text.starts_with("Hi Léa !"));
        assert!(r.keyboard.is_none());
    }

    #[tokio::test]
    async fn text_during_button_step_reshows_buttons() {
        let (flow, _, _) = setup();
        let u = UserId(12);
        flow.start(u, "Kim", None).await.unwrap();
        let r = flow.handle_text(u, "english please", today()).await.unwrap().unwrap();
        assert_eq!(callbacks(&r), vec!["set_language_en", "set_language_fr"]);
    }

    #[tokio::test]
    async fn settings_edits_single_fields() {
        let (flow, users, _) = setup();
        let u = UserId(13);
        users.update(u, |p| p.name = Some("Ana".to_string())).await.unwrap();

        let r = flow.settings(u).await;
        assert_eq!(callbacks(&r).len(), 6);

        let r = flow.handle_callback(u, "config_name", today()).await.unwrap().unwrap();
        assert_eq!(r.text, "Please enter your name:");
        let r = flow.handle_text(u, "Anabel", today()).await.unwrap().unwrap();
        assert_eq!(r.text, "Your Name has been updated to: Anabel");
        assert!(flow.handle_text(u, "hello", today()).await.unwrap().is_none());

        flow.handle_callback(u, "config_birthdate", today()).await.unwrap();
        let r = flow.handle_text(u, "nope", today()).await.unwrap().unwrap();
        assert!(r.text.starts_with("Invalid birthdate format"));
        let r = flow.handle_text(u, "01/01/2000", today()).await.unwrap().unwrap();
        assert_eq!(r.text, "Your Birthdate has been updated to: 01/01/2000");

        let r = flow.handle_callback(u, "set_gender_female", today()).await.unwrap().unwrap();
        assert_eq!(r.text, "Your gender has been set to: Female");

        let r = flow.handle_callback(u, "set_language_fr", today()).await.unwrap().unwrap();
        assert_eq!(r.text, "Ton Langue a été mis à jour à : FR");
        assert_eq!(users.language(u).await, Language::Fr);
    }

    #[tokio::test]
    async fn settings_during_setup_returns_current_step() {
        let (flow, _, _) = setup();
        let u = UserId(14);
        flow.start(u, "Jo", None).await.unwrap();
        flow.handle_callback(u, "set_language_en", today()).await.unwrap();
        let r = flow.settings(u).await;
        assert_eq!(r.text, "Great! Now, what's your name?");
    }

    #[tokio::test]
    async fn unknown_callbacks_are_ignored() {
        let (flow, _, _) = setup();
        assert!(flow.handle_callback(UserId(15), "buy_credits", today()).await.unwrap().is_none());
    }
}
