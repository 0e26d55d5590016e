//! Chat transport — Telegram Bot API client and typed update envelopes.

pub mod telegram;

pub use telegram::{
    CallbackQuery, ForwardedMessage, TelegramApi, TgChat, TgMessage, TgUser, Update, UpdateStream,
};
