//! Core domain + application logic for the Rizzard dating-coach bot.
//!
//! This crate is framework-agnostic. Telegram, OpenAI and Stripe live behind
//! ports (traits) implemented in adapter crates.

pub mod coach;
pub mod config;
pub mod debounce;
pub mod domain;
pub mod errors;
pub mod history;
pub mod i18n;
pub mod logging;
pub mod media;
pub mod messaging;
pub mod model;
pub mod onboarding;
pub mod pipeline;
pub mod reply;
pub mod style;
pub mod users;

pub use errors::{Error, Result};
