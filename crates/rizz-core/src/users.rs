//! User profiles and their persistence.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    domain::UserId,
    errors::Error,
    i18n::{Language, MessageKey},
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn code(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            _ => None,
        }
    }

    pub fn label_key(self) -> MessageKey {
        match self {
            Gender::Male => MessageKey::Male,
            Gender::Female => MessageKey::Female,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preference {
    Heterosexual,
    Homosexual,
    Bisexual,
}

impl Preference {
    pub fn code(self) -> &'static str {
        match self {
            Preference::Heterosexual => "heterosexual",
            Preference::Homosexual => "homosexual",
            Preference::Bisexual => "bisexual",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "heterosexual" => Some(Preference::Heterosexual),
            "homosexual" => Some(Preference::Homosexual),
            "bisexual" => Some(Preference::Bisexual),
            _ => None,
        }
    }

    pub fn label_key(self) -> MessageKey {
        match self {
            Preference::Heterosexual => MessageKey::Heterosexual,
            Preference::Homosexual => MessageKey::Homosexual,
            Preference::Bisexual => MessageKey::Bisexual,
        }
    }
}

/// Where a new user is in the first-run setup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnboardingStep {
    Language,
    Name,
    Birthdate,
    Gender,
    Preference,
}

/// A value requested from `/settings` that the next text message answers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AwaitingInput {
    Name,
    Birthdate,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub sexual_preference: Option<Preference>,
    #[serde(default)]
    pub birthdate: Option<NaiveDate>,
    #[serde(default)]
    pub onboarding: Option<OnboardingStep>,
    #[serde(default)]
    pub awaiting_input: Option<AwaitingInput>,
    #[serde(default)]
    pub credits: u32,
}

impl UserProfile {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            name: None,
            username: None,
            language: Language::default(),
            gender: None,
            sexual_preference: None,
            birthdate: None,
            onboarding: None,
            awaiting_input: None,
            credits: 0,
        }
    }

    pub fn is_onboarding(&self) -> bool {
        self.onboarding.is_some()
    }
}

#[derive(Default, Serialize, Deserialize)]
struct UsersFile {
    users: Vec<UserProfile>,
}

/// In-memory profile map, written through to a JSON file when a path is set.
pub struct UserStore {
    path: Option<PathBuf>,
    users: Mutex<HashMap<UserId, UserProfile>>,
}

impl UserStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            users: Mutex::new(HashMap::new()),
        }
    }

    /// Load `path` if it exists; a missing file starts an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let users = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let file: UsersFile = serde_json::from_slice(&bytes)?;
                file.users.into_iter().map(|u| (u.user_id, u)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        info!(path = %path.display(), count = users.len(), "loaded user profiles");
        Ok(Self {
            path: Some(path),
            users: Mutex::new(users),
        })
    }

    pub async fn get(&self, user_id: UserId) -> Option<UserProfile> {
        self.users.lock().await.get(&user_id).cloned()
    }

    pub async fn exists(&self, user_id: UserId) -> bool {
        self.users.lock().await.contains_key(&user_id)
    }

    /// Language for user-facing strings; English for unknown users.
    pub async fn language(&self, user_id: UserId) -> Language {
        self.users
            .lock()
            .await
            .get(&user_id)
            .map(|u| u.language)
            .unwrap_or_default()
    }

    /// Apply `f` to the user's profile (creating a blank one if needed),
    /// persist, and return the updated profile.
    pub async fn update<F>(&self, user_id: UserId, f: F) -> Result<UserProfile>
    where
        F: FnOnce(&mut UserProfile),
    {
        let mut users = self.users.lock().await;
        let mut profile = users
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| UserProfile::new(user_id));
        f(&mut profile);
        self.commit(&mut users, profile.clone()).await?;
        Ok(profile)
    }

    pub async fn grant_credits(&self, user_id: UserId, credits: u32) -> Result<u32> {
        let profile = self
            .update(user_id, |p| p.credits = p.credits.saturating_add(credits))
            .await?;
        info!(user_id = user_id.0, credits, balance = profile.credits, "granted credits");
        Ok(profile.credits)
    }

    /// Spend one credit. `false` when the balance is already zero.
    pub async fn consume_credit(&self, user_id: UserId) -> Result<bool> {
        let mut users = self.users.lock().await;
        let Some(mut profile) = users.get(&user_id).cloned() else {
            return Ok(false);
        };
        if profile.credits == 0 {
            return Ok(false);
        }
        profile.credits -= 1;
        let balance = profile.credits;
        self.commit(&mut users, profile).await?;
        debug!(user_id = user_id.0, balance, "consumed credit");
        Ok(true)
    }

    /// Store `profile` and persist. A failed write leaves the map as it was.
    async fn commit(&self, users: &mut HashMap<UserId, UserProfile>, profile: UserProfile) -> Result<()> {
        let user_id = profile.user_id;
        let previous = users.insert(user_id, profile);
        if let Err(e) = self.persist(users).await {
            match previous {
                Some(p) => users.insert(user_id, p),
                None => users.remove(&user_id),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn persist(&self, users: &HashMap<UserId, UserProfile>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut list: Vec<UserProfile> = users.values().cloned().collect();
        list.sort_by_key(|u| u.user_id);
        let bytes = serde_json::to_vec_pretty(&UsersFile { users: list })?;
        write_atomic(path, &bytes).await
    }
}

pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn birthdate_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{2})/(\d{2})/(\d{4})$").expect("valid regex"))
}

/// Parse a strict `DD/MM/YYYY` birthdate that is not in the future.
pub fn parse_birthdate(input: &str, today: NaiveDate) -> Result<NaiveDate> {
    let input = input.trim();
    let caps = birthdate_re()
        .captures(input)
        .ok_or_else(|| Error::InvalidInput(format!("not a DD/MM/YYYY date: {input}")))?;

    let day: u32 = caps[1].parse().map_err(|_| Error::InvalidInput(input.to_string()))?;
    let month: u32 = caps[2].parse().map_err(|_| Error::InvalidInput(input.to_string()))?;
    let year: i32 = caps[3].parse().map_err(|_| Error::InvalidInput(input.to_string()))?;

    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| Error::InvalidInput(format!("no such date: {input}")))?;
    if date > today {
        return Err(Error::InvalidInput(format!("birthdate in the future: {input}")));
    }
    Ok(date)
}

/// Age in whole years on `today`.
pub fn age_on(birthdate: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birthdate.year();
    if (today.month(), today.day()) < (birthdate.month(), birthdate.day()) {
        age -= 1;
    }
    age
}
