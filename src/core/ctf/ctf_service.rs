use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::ctf_models::{BoardItem, ChallengeBoard, GlobalData, Workspace};
use super::ctf_store::{StateStore, StoreError};

/// Characters the board renderer uses as structural markers. Names containing
/// them are rejected up front.
const RESERVED_MARKERS: [char; 3] = ['→', '~', '*'];

#[derive(Debug, thiserror::Error)]
pub enum CtfError {
    #[error("Event {0} is already registered")]
    AlreadyRegistered(u64),
    #[error("Event {0} has already been played")]
    AlreadyPlayed(u64),
    #[error("Event {0} is not registered")]
    NotRegistered(u64),
    #[error("Challenge '{0}' already exists")]
    DuplicateChallenge(String),
    #[error("No challenge named '{0}'")]
    UnknownChallenge(String),
    #[error("No challenge thread matches this channel")]
    UnknownThread,
    #[error("Challenge is already solved")]
    AlreadySolved,
    #[error("'{0}' is empty or contains reserved characters")]
    InvalidName(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Reject names that would collide with the board rendering markers.
pub fn validate_name(name: &str) -> Result<(), CtfError> {
    if name.trim().is_empty() || name.chars().any(|c| RESERVED_MARKERS.contains(&c)) {
        return Err(CtfError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Service owning all per-guild registration state.
///
/// State lives behind a single `RwLock`; every mutating call holds the write
/// guard across both the mutation and the save, so what is on disk is never
/// ahead of what actually happened.
pub struct CtfService<S: StateStore> {
    store: S,
    data: RwLock<GlobalData>,
}

impl<S: StateStore> CtfService<S> {
    /// Load persisted state and write it straight back, so a fresh deployment
    /// always has a valid file on disk after first run.
    pub async fn new(store: S) -> Result<Self, CtfError> {
        let data = store.load().await?;
        store.save(&data).await?;

        Ok(Self {
            store,
            data: RwLock::new(data),
        })
    }

    async fn persist(&self, data: &GlobalData) -> Result<(), CtfError> {
        self.store.save(data).await?;
        Ok(())
    }

    /// Check that an event can still be registered in this guild.
    pub async fn check_registrable(&self, guild_id: u64, event_id: u64) -> Result<(), CtfError> {
        let data = self.data.read().await;
        let Some(server) = data.servers.get(&guild_id) else {
            return Ok(());
        };

        if server.events.contains_key(&event_id) {
            return Err(CtfError::AlreadyRegistered(event_id));
        }
        if server.archived_events.contains(&event_id) {
            return Err(CtfError::AlreadyPlayed(event_id));
        }
        Ok(())
    }

    /// Record a freshly created workspace. Re-runs the registration checks:
    /// channel creation happens between `check_registrable` and here.
    pub async fn record_registration(
        &self,
        guild_id: u64,
        event_id: u64,
        workspace: Workspace,
    ) -> Result<(), CtfError> {
        let mut data = self.data.write().await;
        let server = data.servers.entry(guild_id).or_default();

        if server.events.contains_key(&event_id) {
            return Err(CtfError::AlreadyRegistered(event_id));
        }
        if server.archived_events.contains(&event_id) {
            return Err(CtfError::AlreadyPlayed(event_id));
        }

        server.events.insert(event_id, workspace);
        self.persist(&data).await
    }

    /// Find the active event owning `channel_id`, if any.
    pub async fn find_active_event(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> Option<(u64, Workspace)> {
        let data = self.data.read().await;
        let server = data.servers.get(&guild_id)?;
        server
            .events
            .iter()
            .find(|(_, ws)| ws.owns_channel(channel_id))
            .map(|(id, ws)| (*id, ws.clone()))
    }

    pub async fn workspace(&self, guild_id: u64, event_id: u64) -> Option<Workspace> {
        let data = self.data.read().await;
        data.servers.get(&guild_id)?.events.get(&event_id).cloned()
    }

    /// Active events of a guild, ordered by event id.
    pub async fn registered_events(&self, guild_id: u64) -> Vec<(u64, Workspace)> {
        let data = self.data.read().await;
        let mut events: Vec<(u64, Workspace)> = data
            .servers
            .get(&guild_id)
            .map(|s| s.events.iter().map(|(id, ws)| (*id, ws.clone())).collect())
            .unwrap_or_default();
        events.sort_by_key(|(id, _)| *id);
        events
    }

    /// Move an active event into the archive. One-way by design: the id is
    /// appended to `archived_events` and can never be registered again.
    pub async fn archive_event(&self, guild_id: u64, event_id: u64) -> Result<Workspace, CtfError> {
        let mut data = self.data.write().await;
        let server = data
            .servers
            .get_mut(&guild_id)
            .ok_or(CtfError::NotRegistered(event_id))?;

        let workspace = server
            .events
            .remove(&event_id)
            .ok_or(CtfError::NotRegistered(event_id))?;
        server.archived_events.push(event_id);
        server.boards.remove(&event_id);
        server.reminders.remove(&workspace.join_channel_id);

        self.persist(&data).await?;
        Ok(workspace)
    }

    /// Unregister an event without archiving it. Repair command; the channels
    /// are left in place.
    pub async fn remove_event(&self, guild_id: u64, event_id: u64) -> Result<Workspace, CtfError> {
        let mut data = self.data.write().await;
        let server = data
            .servers
            .get_mut(&guild_id)
            .ok_or(CtfError::NotRegistered(event_id))?;

        let workspace = server
            .events
            .remove(&event_id)
            .ok_or(CtfError::NotRegistered(event_id))?;
        server.boards.remove(&event_id);
        server.reminders.remove(&workspace.join_channel_id);

        self.persist(&data).await?;
        Ok(workspace)
    }

    pub async fn set_event_category(&self, guild_id: u64, category_id: u64) -> Result<(), CtfError> {
        let mut data = self.data.write().await;
        data.servers.entry(guild_id).or_default().event_category_id = Some(category_id);
        self.persist(&data).await
    }

    pub async fn event_category(&self, guild_id: u64) -> Option<u64> {
        let data = self.data.read().await;
        data.servers.get(&guild_id)?.event_category_id
    }

    /// Find the workspace whose challenges channel is `channel_id`.
    pub async fn workspace_by_challenges_channel(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> Option<(u64, Workspace)> {
        let data = self.data.read().await;
        let server = data.servers.get(&guild_id)?;
        server
            .events
            .iter()
            .find(|(_, ws)| ws.challenges_channel_id == channel_id)
            .map(|(id, ws)| (*id, ws.clone()))
    }

    /// Find the workspace whose join channel carries the reacted message.
    pub async fn workspace_by_join_message(
        &self,
        guild_id: u64,
        channel_id: u64,
        message_id: u64,
    ) -> Option<(u64, Workspace)> {
        let data = self.data.read().await;
        let server = data.servers.get(&guild_id)?;
        server
            .events
            .iter()
            .find(|(_, ws)| {
                ws.join_channel_id == channel_id
                    && ws.join_message_id.map_or(true, |m| m == message_id)
            })
            .map(|(id, ws)| (*id, ws.clone()))
    }

    /// Whether a challenge with this name already exists under the category.
    pub async fn challenge_exists(
        &self,
        guild_id: u64,
        event_id: u64,
        category: &str,
        name: &str,
    ) -> bool {
        let data = self.data.read().await;
        let Some(board) = data
            .servers
            .get(&guild_id)
            .and_then(|s| s.boards.get(&event_id))
        else {
            return false;
        };

        match category_section(&board.items, category) {
            Some((start, end)) => board.items[start + 1..end].iter().any(|item| {
                matches!(item, BoardItem::Challenge { name: n, .. }
                    if n.eq_ignore_ascii_case(name))
            }),
            None => false,
        }
    }

    /// Add a challenge under a category, creating the category on first use.
    /// Returns the updated board for rendering.
    pub async fn add_challenge(
        &self,
        guild_id: u64,
        event_id: u64,
        category: &str,
        name: &str,
        thread_id: u64,
    ) -> Result<ChallengeBoard, CtfError> {
        validate_name(category)?;
        validate_name(name)?;

        let mut data = self.data.write().await;
        let server = data.servers.entry(guild_id).or_default();
        let board = server.boards.entry(event_id).or_default();

        let challenge = BoardItem::Challenge {
            name: name.to_string(),
            thread_id,
            solved: false,
            solver: None,
        };

        match category_section(&board.items, category) {
            Some((start, end)) => {
                let duplicate = board.items[start + 1..end].iter().any(|item| {
                    matches!(item, BoardItem::Challenge { name: n, .. }
                        if n.eq_ignore_ascii_case(name))
                });
                if duplicate {
                    return Err(CtfError::DuplicateChallenge(name.to_string()));
                }
                board.items.insert(end, challenge);
            }
            None => {
                board.items.push(BoardItem::Category {
                    name: category.to_string(),
                });
                board.items.push(challenge);
            }
        }

        let board = board.clone();
        self.persist(&data).await?;
        Ok(board)
    }

    /// Remove an unsolved challenge by name; solved entries stay on the board.
    pub async fn remove_challenge(
        &self,
        guild_id: u64,
        event_id: u64,
        name: &str,
    ) -> Result<ChallengeBoard, CtfError> {
        let mut data = self.data.write().await;
        let board = data
            .servers
            .get_mut(&guild_id)
            .and_then(|s| s.boards.get_mut(&event_id))
            .ok_or_else(|| CtfError::UnknownChallenge(name.to_string()))?;

        let index = board
            .items
            .iter()
            .position(|item| {
                matches!(item, BoardItem::Challenge { name: n, .. }
                    if n.eq_ignore_ascii_case(name))
            })
            .ok_or_else(|| CtfError::UnknownChallenge(name.to_string()))?;

        if matches!(board.items[index], BoardItem::Challenge { solved: true, .. }) {
            return Err(CtfError::AlreadySolved);
        }

        board.items.remove(index);
        drop_empty_categories(&mut board.items);

        let board = board.clone();
        self.persist(&data).await?;
        Ok(board)
    }

    /// Mark the challenge owning `thread_id` as solved. Scans every board of
    /// the guild, as threads carry no workspace information of their own.
    pub async fn solve_challenge(
        &self,
        guild_id: u64,
        thread_id: u64,
        solver: &str,
    ) -> Result<(u64, ChallengeBoard), CtfError> {
        let mut data = self.data.write().await;
        let server = data
            .servers
            .get_mut(&guild_id)
            .ok_or(CtfError::UnknownThread)?;

        // Find first, then mutate.
        let mut target = None;
        for (event_id, board) in server.boards.iter() {
            if let Some(index) = board.items.iter().position(|item| {
                matches!(item, BoardItem::Challenge { thread_id: t, .. } if *t == thread_id)
            }) {
                target = Some((*event_id, index));
                break;
            }
        }
        let (event_id, index) = target.ok_or(CtfError::UnknownThread)?;

        let board = server.boards.get_mut(&event_id).expect("board just found");
        match &mut board.items[index] {
            BoardItem::Challenge { solved, solver: s, .. } => {
                if *solved {
                    return Err(CtfError::AlreadySolved);
                }
                *solved = true;
                *s = Some(solver.to_string());
            }
            BoardItem::Category { .. } => unreachable!("index points at a challenge"),
        }

        let board = board.clone();
        self.persist(&data).await?;
        Ok((event_id, board))
    }

    pub async fn board(&self, guild_id: u64, event_id: u64) -> Option<ChallengeBoard> {
        let data = self.data.read().await;
        data.servers.get(&guild_id)?.boards.get(&event_id).cloned()
    }

    /// Remember which message renders the board, so later mutations edit it
    /// instead of posting a new one.
    pub async fn set_board_message(
        &self,
        guild_id: u64,
        event_id: u64,
        message_id: u64,
    ) -> Result<(), CtfError> {
        let mut data = self.data.write().await;
        let server = data.servers.entry(guild_id).or_default();
        server.boards.entry(event_id).or_default().message_id = Some(message_id);
        self.persist(&data).await
    }

    /// Toggle a start reminder for a channel. Returns true when one was added.
    pub async fn toggle_reminder(
        &self,
        guild_id: u64,
        channel_id: u64,
        at: DateTime<Utc>,
    ) -> Result<bool, CtfError> {
        let mut data = self.data.write().await;
        let server = data.servers.entry(guild_id).or_default();

        let added = if server.reminders.remove(&channel_id).is_some() {
            false
        } else {
            server.reminders.insert(channel_id, at);
            true
        };

        self.persist(&data).await?;
        Ok(added)
    }

    /// Drain reminders that are due, returning (guild, channel) pairs to
    /// announce into.
    pub async fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<(u64, u64)>, CtfError> {
        let mut data = self.data.write().await;

        let mut due = Vec::new();
        for (guild_id, server) in data.servers.iter() {
            for (channel_id, at) in server.reminders.iter() {
                if *at <= now {
                    due.push((*guild_id, *channel_id));
                }
            }
        }

        if !due.is_empty() {
            for (guild_id, channel_id) in &due {
                if let Some(server) = data.servers.get_mut(guild_id) {
                    server.reminders.remove(channel_id);
                }
            }
            self.persist(&data).await?;
        }

        Ok(due)
    }
}

/// Locate a category header, returning (header index, end of section).
/// The section ends at the next header or the end of the list.
fn category_section(items: &[BoardItem], category: &str) -> Option<(usize, usize)> {
    let start = items.iter().position(|item| {
        matches!(item, BoardItem::Category { name } if name.eq_ignore_ascii_case(category))
    })?;
    let end = items[start + 1..]
        .iter()
        .position(|item| matches!(item, BoardItem::Category { .. }))
        .map(|offset| start + 1 + offset)
        .unwrap_or(items.len());
    Some((start, end))
}

/// Remove category headers with no challenges left under them.
fn drop_empty_categories(items: &mut Vec<BoardItem>) {
    let mut i = 0;
    while i < items.len() {
        let empty_header = matches!(items[i], BoardItem::Category { .. })
            && items
                .get(i + 1)
                .map_or(true, |next| matches!(next, BoardItem::Category { .. }));
        if empty_header {
            items.remove(i);
        } else {
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Mutex;

    /// In-memory store so service behavior can be tested without touching
    /// the filesystem. `saved` mirrors what would be on disk.
    #[derive(Default)]
    struct MemoryStore {
        saved: Mutex<GlobalData>,
    }

    #[async_trait]
    impl StateStore for MemoryStore {
        async fn load(&self) -> Result<GlobalData, StoreError> {
            Ok(self.saved.lock().unwrap().clone())
        }

        async fn save(&self, data: &GlobalData) -> Result<(), StoreError> {
            *self.saved.lock().unwrap() = data.clone();
            Ok(())
        }
    }

    fn workspace() -> Workspace {
        Workspace {
            join_channel_id: 100,
            logs_channel_id: 101,
            challenges_channel_id: 102,
            general_channel_id: 103,
            join_message_id: Some(900),
            event_start: None,
        }
    }

    async fn service() -> CtfService<MemoryStore> {
        CtfService::new(MemoryStore::default()).await.unwrap()
    }

    const GUILD: u64 = 42;

    #[tokio::test]
    async fn register_then_archive_lifecycle() {
        let svc = service().await;
        svc.record_registration(GUILD, 1, workspace()).await.unwrap();

        // Invoking from any workspace channel finds the event.
        let (event_id, _) = svc.find_active_event(GUILD, 103).await.unwrap();
        assert_eq!(event_id, 1);

        svc.archive_event(GUILD, 1).await.unwrap();
        assert!(svc.find_active_event(GUILD, 103).await.is_none());
        assert!(svc.registered_events(GUILD).await.is_empty());

        // Re-registration of a played event is permanently blocked.
        assert!(matches!(
            svc.check_registrable(GUILD, 1).await,
            Err(CtfError::AlreadyPlayed(1))
        ));
        assert!(matches!(
            svc.record_registration(GUILD, 1, workspace()).await,
            Err(CtfError::AlreadyPlayed(1))
        ));
    }

    #[tokio::test]
    async fn double_registration_is_rejected() {
        let svc = service().await;
        svc.record_registration(GUILD, 7, workspace()).await.unwrap();

        assert!(matches!(
            svc.check_registrable(GUILD, 7).await,
            Err(CtfError::AlreadyRegistered(7))
        ));
    }

    #[tokio::test]
    async fn archive_of_unknown_event_fails() {
        let svc = service().await;
        assert!(matches!(
            svc.archive_event(GUILD, 9).await,
            Err(CtfError::NotRegistered(9))
        ));
    }

    #[tokio::test]
    async fn mutations_are_persisted_to_the_store() {
        let store = MemoryStore::default();
        let svc = CtfService::new(store).await.unwrap();
        svc.record_registration(GUILD, 1, workspace()).await.unwrap();

        let saved = svc.store.saved.lock().unwrap().clone();
        assert!(saved.servers.get(&GUILD).unwrap().events.contains_key(&1));
    }

    #[tokio::test]
    async fn duplicate_challenge_is_rejected() {
        let svc = service().await;
        svc.record_registration(GUILD, 1, workspace()).await.unwrap();

        svc.add_challenge(GUILD, 1, "pwn", "heapnote", 500)
            .await
            .unwrap();
        let err = svc
            .add_challenge(GUILD, 1, "pwn", "heapnote", 501)
            .await
            .unwrap_err();
        assert!(matches!(err, CtfError::DuplicateChallenge(_)));

        // Exactly one header and one entry, not two.
        let board = svc.board(GUILD, 1).await.unwrap();
        assert_eq!(board.items.len(), 2);
    }

    #[tokio::test]
    async fn challenges_group_under_their_category() {
        let svc = service().await;
        svc.add_challenge(GUILD, 1, "pwn", "a", 500).await.unwrap();
        svc.add_challenge(GUILD, 1, "web", "b", 501).await.unwrap();
        svc.add_challenge(GUILD, 1, "pwn", "c", 502).await.unwrap();

        let board = svc.board(GUILD, 1).await.unwrap();
        let names: Vec<String> = board
            .items
            .iter()
            .map(|item| match item {
                BoardItem::Category { name } => format!("#{name}"),
                BoardItem::Challenge { name, .. } => name.clone(),
            })
            .collect();
        assert_eq!(names, ["#pwn", "a", "c", "#web", "b"]);
    }

    #[tokio::test]
    async fn solve_is_idempotent_in_effect() {
        let svc = service().await;
        svc.add_challenge(GUILD, 1, "web", "inject", 500)
            .await
            .unwrap();

        let (event_id, board) = svc.solve_challenge(GUILD, 500, "ada").await.unwrap();
        assert_eq!(event_id, 1);
        assert!(matches!(
            board.challenge_by_thread(500),
            Some(BoardItem::Challenge { solved: true, solver: Some(s), .. }) if s == "ada"
        ));

        assert!(matches!(
            svc.solve_challenge(GUILD, 500, "bob").await,
            Err(CtfError::AlreadySolved)
        ));
        // The first solver is still credited.
        let board = svc.board(GUILD, 1).await.unwrap();
        assert!(matches!(
            board.challenge_by_thread(500),
            Some(BoardItem::Challenge { solver: Some(s), .. }) if s == "ada"
        ));
    }

    #[tokio::test]
    async fn solve_outside_any_thread_fails() {
        let svc = service().await;
        assert!(matches!(
            svc.solve_challenge(GUILD, 1234, "ada").await,
            Err(CtfError::UnknownThread)
        ));
    }

    #[tokio::test]
    async fn removing_last_challenge_drops_the_category() {
        let svc = service().await;
        svc.add_challenge(GUILD, 1, "crypto", "rsa", 500)
            .await
            .unwrap();
        svc.add_challenge(GUILD, 1, "web", "xss", 501).await.unwrap();

        let board = svc.remove_challenge(GUILD, 1, "rsa").await.unwrap();
        assert!(!board.items.iter().any(
            |item| matches!(item, BoardItem::Category { name } if name == "crypto")
        ));
        assert_eq!(board.items.len(), 2);
    }

    #[tokio::test]
    async fn solved_challenges_cannot_be_removed() {
        let svc = service().await;
        svc.add_challenge(GUILD, 1, "pwn", "rop", 500).await.unwrap();
        svc.solve_challenge(GUILD, 500, "ada").await.unwrap();

        assert!(matches!(
            svc.remove_challenge(GUILD, 1, "rop").await,
            Err(CtfError::AlreadySolved)
        ));
    }

    #[test]
    fn names_with_rendering_markers_are_rejected() {
        assert!(validate_name("heap note").is_ok());
        assert!(matches!(validate_name("a→b"), Err(CtfError::InvalidName(_))));
        assert!(matches!(validate_name("~~x~~"), Err(CtfError::InvalidName(_))));
        assert!(matches!(validate_name("*pwn*"), Err(CtfError::InvalidName(_))));
        assert!(matches!(validate_name("  "), Err(CtfError::InvalidName(_))));
    }

    #[tokio::test]
    async fn reminder_toggles_and_drains_when_due() {
        let svc = service().await;
        let now = Utc::now();

        assert!(svc.toggle_reminder(GUILD, 100, now).await.unwrap());
        // Second toggle removes it.
        assert!(!svc.toggle_reminder(GUILD, 100, now).await.unwrap());

        svc.toggle_reminder(GUILD, 100, now - Duration::minutes(1))
            .await
            .unwrap();
        svc.toggle_reminder(GUILD, 200, now + Duration::hours(1))
            .await
            .unwrap();

        let due = svc.due_reminders(now).await.unwrap();
        assert_eq!(due, vec![(GUILD, 100)]);
        // Drained: a second sweep finds nothing.
        assert!(svc.due_reminders(now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn archive_clears_board_and_reminder() {
        let svc = service().await;
        svc.record_registration(GUILD, 1, workspace()).await.unwrap();
        svc.add_challenge(GUILD, 1, "misc", "warmup", 500)
            .await
            .unwrap();
        svc.toggle_reminder(GUILD, 100, Utc::now()).await.unwrap();

        svc.archive_event(GUILD, 1).await.unwrap();
        assert!(svc.board(GUILD, 1).await.is_none());
        assert!(svc.due_reminders(Utc::now()).await.unwrap().is_empty());
    }
}
