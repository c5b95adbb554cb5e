use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Root of everything the bot persists. One instance per process,
/// serialized to disk after every mutation.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GlobalData {
    #[serde(default)]
    pub servers: HashMap<u64, ServerData>,
}

/// Per-guild registration state.
///
/// Invariant: an event id present in `events` never also appears in
/// `archived_events`. Archiving is one-way; a played event can never be
/// registered again.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ServerData {
    /// Active events, keyed by CTFtime event id.
    #[serde(default)]
    pub events: HashMap<u64, Workspace>,
    /// Completed event ids, append-only.
    #[serde(default)]
    pub archived_events: Vec<u64>,
    /// Challenge boards, keyed by event id.
    #[serde(default)]
    pub boards: HashMap<u64, ChallengeBoard>,
    /// Scheduled start announcements, keyed by the channel they post into.
    #[serde(default)]
    pub reminders: HashMap<u64, DateTime<Utc>>,
    /// Per-guild override for the category new workspaces are created under.
    #[serde(default)]
    pub event_category_id: Option<u64>,
}

/// The set of channels created for one registered event. All ids are
/// Discord snowflakes, treated as opaque integers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workspace {
    pub join_channel_id: u64,
    pub logs_channel_id: u64,
    pub challenges_channel_id: u64,
    pub general_channel_id: u64,
    /// The message carrying the join reaction, once posted.
    #[serde(default)]
    pub join_message_id: Option<u64>,
    /// Event start time, captured at registration for reminders.
    #[serde(default)]
    pub event_start: Option<DateTime<Utc>>,
}

impl Workspace {
    /// Whether `channel_id` is one of this workspace's channels.
    pub fn owns_channel(&self, channel_id: u64) -> bool {
        self.join_channel_id == channel_id
            || self.logs_channel_id == channel_id
            || self.challenges_channel_id == channel_id
            || self.general_channel_id == channel_id
    }

    /// Channels hidden from non-members until they join via reaction.
    pub fn internal_channels(&self) -> [u64; 3] {
        [
            self.logs_channel_id,
            self.challenges_channel_id,
            self.general_channel_id,
        ]
    }
}

/// Challenge list for one workspace. This structure is the source of truth;
/// the Discord message is regenerated from it on every mutation and never
/// parsed back.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ChallengeBoard {
    /// The rendered board message in the challenges channel, once posted.
    #[serde(default)]
    pub message_id: Option<u64>,
    /// Challenges belong to the nearest preceding `Category` item.
    #[serde(default)]
    pub items: Vec<BoardItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BoardItem {
    Category {
        name: String,
    },
    Challenge {
        name: String,
        thread_id: u64,
        solved: bool,
        #[serde(default)]
        solver: Option<String>,
    },
}

impl ChallengeBoard {
    /// Find the challenge item with the given thread id.
    pub fn challenge_by_thread(&self, thread_id: u64) -> Option<&BoardItem> {
        self.items.iter().find(|item| {
            matches!(item, BoardItem::Challenge { thread_id: t, .. } if *t == thread_id)
        })
    }
}
