//! Reminder delivery over the Telegram Bot API.

use async_trait::async_trait;

use rozklad_scheduler::DeliverySink;
use rozklad_telegram::TelegramApi;
use rozklad_telegram::types::SendMessageParams;

/// Sends scheduler reminders as plain bot messages.
pub struct TelegramSink {
    api: TelegramApi,
}

impl TelegramSink {
    pub fn new(api: TelegramApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl DeliverySink for TelegramSink {
    async fn deliver(&self, chat_id: i64, text: String) -> anyhow::Result<()> {
        self.api
            .send_message(&SendMessageParams {
                chat_id,
                text,
                parse_mode: Some("HTML".into()),
                disable_web_page_preview: None,
                reply_markup: None,
            })
            .await?;
        Ok(())
    }
}
