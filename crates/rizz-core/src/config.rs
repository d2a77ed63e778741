use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use crate::{debounce::DebounceConfig, errors::Error, Result};

/// Typed configuration for the bot, read from the process environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub temp_dir: PathBuf,
    pub data_dir: PathBuf,

    // OpenAI
    pub openai: OpenAiConfig,

    // Conversation
    pub chat_temperature: f32,
    pub history_limit: usize,
    pub arrival_gap_threshold: Duration,
    pub debounce_delay: Duration,

    // Video
    pub ffmpeg_path: PathBuf,
    pub video_frame_interval: Duration,
    pub video_max_frames: usize,

    /// `None` when Stripe is not configured; premium gating is then off.
    pub payments: Option<PaymentsConfig>,
}

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub vision_model: String,
    pub summary_model: String,
    pub transcription_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub embedding_model: String,
    pub http_timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct PaymentsConfig {
    pub stripe_secret_key: String,
    pub webhook_secret: String,
    pub success_url: String,
    pub cancel_url: String,
    pub port: u16,
    pub price_cents: u64,
    pub currency: String,
    pub credits_per_purchase: u32,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        let cfg = Self::from_lookup(|key| env::var(key).ok())?;

        // Downloads and ffmpeg output land here.
        fs::create_dir_all(&cfg.temp_dir)?;
        fs::create_dir_all(&cfg.data_dir)?;
        Ok(cfg)
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env(&lookup);

        let telegram_bot_token = env.required("TELEGRAM_BOT_TOKEN")?;
        let api_key = env.required("OPENAI_API_KEY")?;

        let openai = OpenAiConfig {
            api_key,
            base_url: env
                .string("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            chat_model: env.string_or("OPENAI_CHAT_MODEL", "gpt-4o-mini"),
            vision_model: env.string_or("OPENAI_VISION_MODEL", "gpt-4o-mini"),
            summary_model: env.string_or("OPENAI_SUMMARY_MODEL", "gpt-4o-mini"),
            transcription_model: env.string_or("OPENAI_TRANSCRIPTION_MODEL", "whisper-1"),
            tts_model: env.string_or("OPENAI_TTS_MODEL", "tts-1"),
            tts_voice: env.string_or("OPENAI_TTS_VOICE", "nova"),
            embedding_model: env.string_or("OPENAI_EMBEDDING_MODEL", "text-embedding-3-small"),
            http_timeout: Duration::from_secs(env.u64("HTTP_TIMEOUT_SECS").unwrap_or(60)),
        };

        let chat_temperature = env.f32("CHAT_TEMPERATURE").unwrap_or(0.7).clamp(0.0, 2.0);
        let history_limit = env.usize("HISTORY_LIMIT").unwrap_or(40).max(1);
        let arrival_gap_threshold =
            Duration::from_millis(env.u64("ARRIVAL_GAP_THRESHOLD_MS").unwrap_or(2_000));
        let debounce_delay = Duration::from_millis(env.u64("DEBOUNCE_DELAY_MS").unwrap_or(10_000));

        let temp_dir = PathBuf::from(env.string_or("TEMP_DIR", "/tmp/rizzard"));
        let data_dir = PathBuf::from(env.string_or("DATA_DIR", "./data"));

        let ffmpeg_path = PathBuf::from(env.string_or("FFMPEG_PATH", "ffmpeg"));
        let video_frame_interval =
            Duration::from_secs(env.u64("VIDEO_FRAME_INTERVAL_SECS").unwrap_or(1).max(1));
        let video_max_frames = env.usize("VIDEO_MAX_FRAMES").unwrap_or(8).max(1);

        let payments = match env.string("STRIPE_SECRET_KEY") {
            None => None,
            Some(stripe_secret_key) => {
                let webhook_secret = env.string("STRIPE_WEBHOOK_SECRET").ok_or_else(|| {
                    Error::Config(
                        "STRIPE_WEBHOOK_SECRET is required when STRIPE_SECRET_KEY is set"
                            .to_string(),
                    )
                })?;
                let port = match env.string("PORT") {
                    None => 3000,
                    Some(raw) => raw
                        .trim()
                        .parse::<u16>()
                        .map_err(|_| Error::Config(format!("PORT is not a valid port: {raw}")))?,
                };
                Some(PaymentsConfig {
                    stripe_secret_key,
                    webhook_secret,
                    success_url: env.string_or("PAYMENT_SUCCESS_URL", "https://t.me"),
                    cancel_url: env.string_or("PAYMENT_CANCEL_URL", "https://t.me"),
                    port,
                    price_cents: env.u64("PAYMENT_PRICE_CENTS").unwrap_or(199),
                    currency: env.string_or("PAYMENT_CURRENCY", "eur").to_lowercase(),
                    credits_per_purchase: env.u32("PAYMENT_CREDITS").unwrap_or(50),
                })
            }
        };

        Ok(Self {
            telegram_bot_token,
            temp_dir,
            data_dir,
            openai,
            chat_temperature,
            history_limit,
            arrival_gap_threshold,
            debounce_delay,
            ffmpeg_path,
            video_frame_interval,
            video_max_frames,
            payments,
        })
    }

    pub fn debounce(&self) -> DebounceConfig {
        DebounceConfig {
            arrival_gap_threshold: self.arrival_gap_threshold,
            debounce_delay: self.debounce_delay,
        }
    }

    pub fn users_file(&self) -> PathBuf {
        self.data_dir.join("users.json")
    }

    pub fn payments_enabled(&self) -> bool {
        self.payments.is_some()
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key).and_then(non_empty)
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.string(key).unwrap_or_else(|| default.to_string())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.string(key)
            .ok_or_else(|| Error::Config(format!("{key} environment variable is required")))
    }

    fn u64(&self, key: &str) -> Option<u64> {
        self.string(key).and_then(|s| s.trim().parse::<u64>().ok())
    }

    fn u32(&self, key: &str) -> Option<u32> {
        self.string(key).and_then(|s| s.trim().parse::<u32>().ok())
    }

    fn usize(&self, key: &str) -> Option<usize> {
        self.string(key).and_then(|s| s.trim().parse::<usize>().ok())
    }

    fn f32(&self, key: &str) -> Option<f32> {
        self.string(key)
            .and_then(|s| s.trim().parse::<f32>().ok())
            .filter(|v| v.is_finite())
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = &val[1..val.len() - 1];
        }
        out.push((key.to_string(), val.to_string()));
    }
    out
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
