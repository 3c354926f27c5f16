//! Display surface for session boards.
//!
//! A session is shown on two channels: the operator's board carries the live
//! code (for the projector), the participants' notice only says attendance is
//! open. The core never interprets [`MessageRef`]s; it stores them at session
//! start and hands them back at close.
//!
//! [`InMemoryBoard`] is the surface this service ships with: messages are
//! kept in memory and served over HTTP for a projector page to poll.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;

/// Location of a posted message on the display surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MessageRef {
    pub channel_id: u64,
    pub message_id: u64,
}

/// What a board message shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BoardContent {
    /// Operator board: current code and submissions so far.
    Code { code: String, submissions: usize },
    /// Participant notice while a session is open.
    Open,
    /// Either board after the session closed.
    Closed { total: usize },
}

/// Display surface failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisplayError {
    /// The message no longer exists (e.g. deleted by a moderator).
    #[error("Message not found")]
    MessageNotFound,

    /// The surface could not be reached.
    #[error("Display unavailable: {0}")]
    Unavailable(String),
}

/// Trait for display surface operations (enables mocking).
#[async_trait]
pub trait DisplaySurface: Send + Sync {
    /// Post a new message on a channel.
    async fn publish(&self, channel_id: u64, content: BoardContent)
        -> Result<MessageRef, DisplayError>;

    /// Replace the content of an existing message.
    async fn update(&self, message: &MessageRef, content: BoardContent)
        -> Result<(), DisplayError>;
}

/// A message as stored by [`InMemoryBoard`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardMessage {
    pub message_id: u64,
    pub content: BoardContent,
}

/// In-process display surface.
#[derive(Debug, Default)]
pub struct InMemoryBoard {
    messages: RwLock<BTreeMap<MessageRef, BoardContent>>,
    next_id: AtomicU64,
}

impl InMemoryBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages currently posted on a channel, oldest first.
    pub async fn channel(&self, channel_id: u64) -> Vec<BoardMessage> {
        self.messages
            .read()
            .await
            .iter()
            .filter(|(r, _)| r.channel_id == channel_id)
            .map(|(r, content)| BoardMessage {
                message_id: r.message_id,
                content: content.clone(),
            })
            .collect()
    }

    /// Remove a message, as a moderator deleting it would.
    pub async fn delete(&self, message: &MessageRef) -> bool {
        self.messages.write().await.remove(message).is_some()
    }
}

#[async_trait]
impl DisplaySurface for InMemoryBoard {
    async fn publish(
        &self,
        channel_id: u64,
        content: BoardContent,
    ) -> Result<MessageRef, DisplayError> {
        let message_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let message = MessageRef {
            channel_id,
            message_id,
        };
        self.messages.write().await.insert(message, content);
        Ok(message)
    }

    async fn update(&self, message: &MessageRef, content: BoardContent) -> Result<(), DisplayError> {
        match self.messages.write().await.get_mut(message) {
            Some(slot) => {
                *slot = content;
                Ok(())
            }
            None => Err(DisplayError::MessageNotFound),
        }
    }
}

/// Mock display surface for testing.
pub mod mock {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    /// Recorded display call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum DisplayCall {
        Publish { channel_id: u64, content: BoardContent },
        Update { message: MessageRef, content: BoardContent },
    }

    /// Records calls and can be told to fail.
    #[derive(Debug, Default)]
    pub struct MockDisplay {
        calls: Mutex<Vec<DisplayCall>>,
        next_id: AtomicU64,
        fail_publish: AtomicBool,
        fail_updates: AtomicBool,
        missing_messages: AtomicBool,
    }

    impl MockDisplay {
        /// Create a mock that accepts every call.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make `publish` fail with `Unavailable`.
        pub fn set_fail_publish(&self, fail: bool) {
            self.fail_publish.store(fail, Ordering::SeqCst);
        }

        /// Make `update` fail with `Unavailable`.
        pub fn set_fail_updates(&self, fail: bool) {
            self.fail_updates.store(fail, Ordering::SeqCst);
        }

        /// Make `update` fail with `MessageNotFound`.
        pub fn set_missing_messages(&self, missing: bool) {
            self.missing_messages.store(missing, Ordering::SeqCst);
        }

        /// All calls made so far, in order.
        pub fn calls(&self) -> Vec<DisplayCall> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        /// Contents passed to `update` so far.
        pub fn updates(&self) -> Vec<BoardContent> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    DisplayCall::Update { content, .. } => Some(content),
                    DisplayCall::Publish { .. } => None,
                })
                .collect()
        }

        fn record(&self, call: DisplayCall) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(call);
            }
        }
    }

    #[async_trait]
    impl DisplaySurface for MockDisplay {
        async fn publish(
            &self,
            channel_id: u64,
            content: BoardContent,
        ) -> Result<MessageRef, DisplayError> {
            if self.fail_publish.load(Ordering::SeqCst) {
                return Err(DisplayError::Unavailable("mock publish failure".to_string()));
            }
            self.record(DisplayCall::Publish {
                channel_id,
                content,
            });
            let message_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(MessageRef {
                channel_id,
                message_id,
            })
        }

        async fn update(
            &self,
            message: &MessageRef,
            content: BoardContent,
        ) -> Result<(), DisplayError> {
            self.record(DisplayCall::Update {
                message: *message,
                content,
            });
            if self.missing_messages.load(Ordering::SeqCst) {
                return Err(DisplayError::MessageNotFound);
            }
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(DisplayError::Unavailable("mock update failure".to_string()));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_board_publish_and_update() {
        let board = InMemoryBoard::new();
        let message = board
            .publish(
                10,
                BoardContent::Code {
                    code: "WXYZ".to_string(),
                    submissions: 0,
                },
            )
            .await
            .unwrap();

        board
            .update(
                &message,
                BoardContent::Code {
                    code: "NEWT".to_string(),
                    submissions: 3,
                },
            )
            .await
            .unwrap();

        let messages = board.channel(10).await;
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].content,
            BoardContent::Code {
                code: "NEWT".to_string(),
                submissions: 3
            }
        );
    }

    #[tokio::test]
    async fn test_board_channels_are_separate() {
        let board = InMemoryBoard::new();
        board.publish(1, BoardContent::Open).await.unwrap();
        board.publish(2, BoardContent::Closed { total: 4 }).await.unwrap();
        board.publish(1, BoardContent::Closed { total: 1 }).await.unwrap();

        assert_eq!(board.channel(1).await.len(), 2);
        assert_eq!(board.channel(2).await.len(), 1);
        assert!(board.channel(3).await.is_empty());
    }

    #[tokio::test]
    async fn test_board_update_deleted_message() {
        let board = InMemoryBoard::new();
        let message = board.publish(1, BoardContent::Open).await.unwrap();
        assert!(board.delete(&message).await);

        let result = board.update(&message, BoardContent::Closed { total: 0 }).await;
        assert_eq!(result, Err(DisplayError::MessageNotFound));
    }

    #[test]
    fn test_board_content_serialization() {
        let json = serde_json::to_value(BoardContent::Code {
            code: "AB23".to_string(),
            submissions: 2,
        })
        .unwrap();
        assert_eq!(json["kind"], "code");
        assert_eq!(json["code"], "AB23");
        assert_eq!(json["submissions"], 2);
    }
}
