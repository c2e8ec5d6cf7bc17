//! Telegram Bot API transport.
//!
//! A thin client over the HTTP Bot API with long-polling (no webhook
//! required). The polling loop turns raw updates into [`BotEvent`]s;
//! everything the bot actually says goes back out through [`TelegramApi`].

pub mod api;
pub mod polling;
pub mod types;

pub use api::TelegramApi;
pub use polling::{BotEvent, run_polling_loop};
