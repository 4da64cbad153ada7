//! Server & Channel Directory
//!
//! In-memory directory of known servers and their channels. The RTC layer
//! consults it for the join-ticket pre-checks: does the channel exist, and is
//! it a voice channel.

use std::collections::HashMap;

use tokio::sync::RwLock;

/// What kind of traffic a channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Text messaging channel.
    Text,
    /// Voice channel hosting call sessions.
    Voice,
}

#[derive(Default)]
struct DirectoryInner {
    /// channel id -> owning server id
    channel_servers: HashMap<String, String>,
    /// channel id -> kind
    channel_kinds: HashMap<String, ChannelKind>,
    /// known server ids
    servers: Vec<String>,
}

/// Directory of servers and channels.
#[derive(Default)]
pub struct Directory {
    inner: RwLock<DirectoryInner>,
}

impl Directory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory seeded with the built-in development dataset.
    #[must_use]
    pub fn with_fixture_data() -> Self {
        let mut inner = DirectoryInner::default();

        for (server_id, channels) in [
            (
                "srv_harbor",
                vec![
                    ("ch_general", ChannelKind::Text),
                    ("ch_design", ChannelKind::Text),
                    ("ch_release", ChannelKind::Text),
                    ("ch_outage", ChannelKind::Text),
                    ("vc_general", ChannelKind::Voice),
                    ("vc_party", ChannelKind::Voice),
                ],
            ),
            (
                "srv_testlab",
                vec![
                    ("tl_ch_general", ChannelKind::Text),
                    ("tl_ch_qa", ChannelKind::Text),
                    ("tl_vc_huddle", ChannelKind::Voice),
                    ("tl_vc_pairing", ChannelKind::Voice),
                ],
            ),
        ] {
            inner.servers.push(server_id.to_string());
            for (channel_id, kind) in channels {
                inner
                    .channel_servers
                    .insert(channel_id.to_string(), server_id.to_string());
                inner.channel_kinds.insert(channel_id.to_string(), kind);
            }
        }

        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Register a channel under a server.
    pub async fn insert_channel(&self, server_id: &str, channel_id: &str, kind: ChannelKind) {
        let mut inner = self.inner.write().await;
        if !inner.servers.iter().any(|known| known == server_id) {
            inner.servers.push(server_id.to_string());
        }
        inner
            .channel_servers
            .insert(channel_id.to_string(), server_id.to_string());
        inner.channel_kinds.insert(channel_id.to_string(), kind);
    }

    /// Whether a server id is known.
    pub async fn server_exists(&self, server_id: &str) -> bool {
        self.inner
            .read()
            .await
            .servers
            .iter()
            .any(|known| known == server_id)
    }

    /// Whether a channel id is known.
    pub async fn channel_exists(&self, channel_id: &str) -> bool {
        self.inner
            .read()
            .await
            .channel_kinds
            .contains_key(channel_id)
    }

    /// Whether a channel is of voice kind.
    pub async fn is_voice_channel(&self, channel_id: &str) -> bool {
        self.inner.read().await.channel_kinds.get(channel_id) == Some(&ChannelKind::Voice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixture_dataset_is_indexed() {
        let directory = Directory::with_fixture_data();

        assert!(directory.server_exists("srv_harbor").await);
        assert!(directory.server_exists("srv_testlab").await);
        assert!(!directory.server_exists("srv_unknown").await);

        assert!(directory.channel_exists("vc_general").await);
        assert!(directory.is_voice_channel("vc_general").await);
        assert!(directory.is_voice_channel("tl_vc_huddle").await);

        assert!(directory.channel_exists("ch_general").await);
        assert!(!directory.is_voice_channel("ch_general").await);
        assert!(!directory.is_voice_channel("ch_missing").await);
    }

    #[tokio::test]
    async fn inserted_channels_are_visible() {
        let directory = Directory::new();
        directory
            .insert_channel("srv_new", "vc_new", ChannelKind::Voice)
            .await;

        assert!(directory.server_exists("srv_new").await);
        assert!(directory.is_voice_channel("vc_new").await);
    }
}
