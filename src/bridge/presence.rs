//! Last-known presence per Discord user.
//!
//! The online flag is the deduplication key: an update only counts as a
//! change when it flips `online` or introduces a user never seen before.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::common::UserUpdateEvent;

/// Stored state for one guild member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPresenceRecord {
    pub user_id: u64,
    pub discriminator: Option<u16>,
    pub display_name: String,
    pub is_bot: bool,
    pub online: bool,
}

impl UserPresenceRecord {
    /// Whether the record carries identity fields (minimal offline updates don't).
    fn has_identity(&self) -> bool {
        !self.display_name.is_empty()
    }

    /// `name#1234` for accounts that still have a legacy discriminator.
    pub fn tag(&self) -> String {
        match self.discriminator {
            Some(discriminator) => format!("{}#{:04}", self.display_name, discriminator),
            None => self.display_name.clone(),
        }
    }
}

impl From<UserUpdateEvent> for UserPresenceRecord {
    fn from(event: UserUpdateEvent) -> Self {
        Self {
            user_id: event.user_id,
            discriminator: event.discriminator,
            display_name: event.display_name,
            is_bot: event.is_bot,
            online: event.online,
        }
    }
}

/// Presence records keyed by user ID. Owned by the router task.
#[derive(Debug, Default)]
pub struct PresenceStore {
    users: HashMap<u64, UserPresenceRecord>,
}

impl PresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `record`; returns whether the user's online state changed.
    ///
    /// A record without identity keeps the stored identity.
    pub fn update(&mut self, record: UserPresenceRecord) -> bool {
        match self.users.entry(record.user_id) {
            Entry::Vacant(entry) => {
                entry.insert(record);
                true
            }
            Entry::Occupied(mut entry) => {
                let stored = entry.get_mut();
                let changed = stored.online != record.online;
                if record.has_identity() {
                    *stored = record;
                } else {
                    stored.online = record.online;
                }
                changed
            }
        }
    }

    pub fn get(&self, user_id: u64) -> Option<&UserPresenceRecord> {
        self.users.get(&user_id)
    }

    /// Number of users currently known to be online.
    pub fn online_count(&self) -> usize {
        self.users.values().filter(|r| r.online).count()
    }
}
