//! Delivery seam between the scheduler and the transport.

use async_trait::async_trait;

/// Where fired reminders go. The bot implements this over the Telegram
/// API; tests record messages instead.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, chat_id: i64, text: String) -> anyhow::Result<()>;
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    /// Records deliveries; can be told to fail them.
    #[derive(Default)]
    pub struct MockSink {
        pub sent: Mutex<Vec<(i64, String)>>,
        pub fail: AtomicBool,
    }

    impl MockSink {
        pub fn sent(&self) -> Vec<(i64, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeliverySink for MockSink {
        async fn deliver(&self, chat_id: i64, text: String) -> anyhow::Result<()> {
            if self.fail.load(Ordering::Relaxed) {
                anyhow::bail!("mock delivery failure");
            }
            self.sent.lock().unwrap().push((chat_id, text));
            Ok(())
        }
    }
}
