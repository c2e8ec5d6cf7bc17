//! Telegram long-polling loop.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::TelegramApi;
use crate::types::{GetUpdatesParams, Update};

/// An update worth routing: a slash command or an inline button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotEvent {
    Command {
        chat_id: i64,
        from_id: i64,
        command: String,
        args: String,
    },
    Callback {
        id: String,
        chat_id: i64,
        message_id: i64,
        data: String,
    },
}

/// Run the long-polling loop, converting Telegram updates to `BotEvent`.
///
/// Exits when `cancel` is cancelled or the `sender` is closed.
pub async fn run_polling_loop(
    api: &TelegramApi,
    sender: mpsc::Sender<BotEvent>,
    cancel: CancellationToken,
) {
    let mut offset: Option<i64> = None;
    let mut backoff = Duration::from_secs(1);
    let max_backoff = Duration::from_secs(30);

    info!("Telegram polling loop started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let params = GetUpdatesParams {
            offset,
            timeout: Some(30),
            allowed_updates: Some(vec!["message".into(), "callback_query".into()]),
        };

        let updates = tokio::select! {
            _ = cancel.cancelled() => break,
            result = api.get_updates(&params) => result,
        };

        match updates {
            Ok(updates) => {
                backoff = Duration::from_secs(1);

                for update in updates {
                    let update_id = update.update_id;
                    offset = Some(update_id + 1);

                    let Some(event) = event_from(update) else {
                        continue;
                    };

                    debug!(update_id, "Forwarding Telegram event");

                    if sender.send(event).await.is_err() {
                        info!("Event channel closed, stopping polling");
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(backoff_secs = backoff.as_secs(), "getUpdates error: {e}");

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {},
                }

                backoff = (backoff * 2).min(max_backoff);
            }
        }
    }

    info!("Telegram polling loop stopped");
}

/// Convert one update into a routable event.
///
/// Plain text messages are dropped: the bot only reacts to commands and
/// button presses. A callback without its origin message cannot be routed
/// (the message is too old), so it is dropped too.
fn event_from(update: Update) -> Option<BotEvent> {
    if let Some(cb) = update.callback_query {
        let msg = cb.message?;
        let data = cb.data?;
        return Some(BotEvent::Callback {
            id: cb.id,
            chat_id: msg.chat.id,
            message_id: msg.message_id,
            data,
        });
    }

    let msg = update.message?;
    let text = msg.text?;

    // Detect bot commands (entity type "bot_command" at offset 0)
    let is_command = msg
        .entities
        .iter()
        .any(|e| e.entity_type == "bot_command" && e.offset == 0);
    if !is_command {
        return None;
    }

    let from_id = msg.from.as_ref().map(|u| u.id).unwrap_or(msg.chat.id);
    let (command, args) = split_command(&text);

    Some(BotEvent::Command {
        chat_id: msg.chat.id,
        from_id,
        command: command.to_string(),
        args: args.to_string(),
    })
}

/// Split "/cmd@botname rest" into ("cmd", "rest").
fn split_command(text: &str) -> (&str, &str) {
    let token = text.split_whitespace().next().unwrap_or("");
    let command = token
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("");
    let args = text.strip_prefix(token).unwrap_or("").trim_start();
    (command, args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command_update(text: &str) -> Update {
        let json = serde_json::json!({
            "update_id": 1,
            "message": {
                "message_id": 10,
                "from": {"id": 42, "is_bot": false, "first_name": "Alice"},
                "chat": {"id": 42, "type": "private"},
                "text": text,
                "entities": [{"type": "bot_command", "offset": 0, "length": text.split(' ').next().unwrap().len()}]
            }
        });
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("/start"), ("start", ""));
        assert_eq!(split_command("/setweek lecture"), ("setweek", "lecture"));
        assert_eq!(split_command("/reload@rozklad_bot"), ("reload", ""));
        assert_eq!(split_command("/autorotate@rozklad_bot off"), ("autorotate", "off"));
    }

    #[test]
    fn test_event_from_command() {
        let event = event_from(command_update("/setweek lecture")).unwrap();
        assert_eq!(event, BotEvent::Command {
            chat_id: 42,
            from_id: 42,
            command: "setweek".into(),
            args: "lecture".into(),
        });
    }

    #[test]
    fn test_event_from_plain_text_dropped() {
        let json = serde_json::json!({
            "update_id": 2,
            "message": {
                "message_id": 11,
                "chat": {"id": 42, "type": "private"},
                "text": "коли пари?"
            }
        });
        let update: Update = serde_json::from_value(json).unwrap();
        assert!(event_from(update).is_none());
    }

    #[test]
    fn test_event_from_callback() {
        let json = serde_json::json!({
            "update_id": 3,
            "callback_query": {
                "id": "cb-9",
                "from": {"id": 42, "is_bot": false, "first_name": "Alice"},
                "message": {
                    "message_id": 12,
                    "chat": {"id": 42, "type": "private"},
                    "text": "Головне меню:"
                },
                "data": "day:practical:Понеділок"
            }
        });
        let update: Update = serde_json::from_value(json).unwrap();
        let event = event_from(update).unwrap();
        assert_eq!(event, BotEvent::Callback {
            id: "cb-9".into(),
            chat_id: 42,
            message_id: 12,
            data: "day:practical:Понеділок".into(),
        });
    }

    #[test]
    fn test_event_from_callback_without_message_dropped() {
        let json = serde_json::json!({
            "update_id": 4,
            "callback_query": {
                "id": "cb-10",
                "from": {"id": 42, "is_bot": false, "first_name": "Alice"},
                "data": "home"
            }
        });
        let update: Update = serde_json::from_value(json).unwrap();
        assert!(event_from(update).is_none());
    }

    #[tokio::test]
    async fn test_polling_loop_cancellation() {
        // Verify that the polling loop exits promptly when cancelled.
        // We use a fake API URL so the request will fail, but the cancel should win.
        let api = TelegramApi::new("fake_token");
        let (tx, _rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        cancel.cancel();

        // Should return immediately since cancel is already set
        tokio::time::timeout(
            Duration::from_secs(2),
            run_polling_loop(&api, tx, cancel),
        )
        .await
        .expect("polling loop should exit promptly on cancel");
    }
}
