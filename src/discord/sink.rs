//! Reply sink posting into the bound Discord channel.

use std::sync::Arc;

use async_trait::async_trait;
use serenity::http::Http;
use serenity::model::id::ChannelId;
use tokio::sync::Mutex;
use tracing::debug;

use crate::common::error::{DiscordError, RelayResult};
use crate::relay::ReplySink;

/// Longest message body Discord accepts, in characters.
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

pub struct ChannelSink {
    http: Arc<Http>,
    channel_id: ChannelId,
    /// Held while the chunks of one message are posted.
    lock: Mutex<()>,
}

impl ChannelSink {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Self {
        Self {
            http,
            channel_id,
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl ReplySink for ChannelSink {
    async fn send(&self, text: &str) -> RelayResult<()> {
        if text.trim().is_empty() {
            debug!("Skipping empty message for channel {}", self.channel_id);
            return Ok(());
        }

        let _guard = self.lock.lock().await;
        for chunk in split_message(text, DISCORD_MESSAGE_LIMIT) {
            self.channel_id
                .say(&self.http, chunk)
                .await
                .map_err(DiscordError::from)?;
        }
        Ok(())
    }
}

/// Byte offset of the `max_chars`-th character, or the end of `s`.
fn char_boundary_after(s: &str, max_chars: usize) -> usize {
    s.char_indices().nth(max_chars).map(|(i, _)| i).unwrap_or(s.len())
}

/// Split a message into chunks of at most `max_chars` characters.
///
/// Splits on the last space that fits, otherwise hard at a character.
pub fn split_message(message: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = message;

    while !remaining.is_empty() {
        let max_chars = max_chars.max(1);
        let split_at = char_boundary_after(remaining, max_chars);
        if split_at == remaining.len() {
            chunks.push(remaining.to_string());
            break;
        }

        // One character past the limit, so a space right at the limit counts.
        let window = &remaining[..char_boundary_after(remaining, max_chars + 1)];
        let head = &remaining[..split_at];
        match window.rfind(' ') {
            Some(space) if space > 0 => {
                chunks.push(remaining[..space].to_string());
                remaining = remaining[space + 1..].trim_start_matches(' ');
            }
            _ => {
                chunks.push(head.to_string());
                remaining = &remaining[split_at..];
            }
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_untouched() {
        assert_eq!(split_message("JOINED: Steve joined the game", 2000), vec!["JOINED: Steve joined the game"]);
    }

    #[test]
    fn test_splits_on_spaces() {
        assert_eq!(split_message("aaa bbb ccc", 7), vec!["aaa bbb", "ccc"]);
        assert_eq!(split_message("aaa bbb ccc", 5), vec!["aaa", "bbb", "ccc"]);
    }

    #[test]
    fn test_hard_split_without_spaces() {
        assert_eq!(split_message("abcdefgh", 3), vec!["abc", "def", "gh"]);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let text = "ä".repeat(2500);
        let chunks = split_message(&text, DISCORD_MESSAGE_LIMIT);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 2000);
        assert_eq!(chunks[1].chars().count(), 500);
    }

    #[test]
    fn test_every_chunk_fits() {
        let text = "word ".repeat(1000);
        for chunk in split_message(&text, DISCORD_MESSAGE_LIMIT) {
            assert!(chunk.chars().count() <= DISCORD_MESSAGE_LIMIT);
        }
    }
}
