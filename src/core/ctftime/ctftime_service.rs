use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Errors raised by the CTFtime lookup workflow.
#[derive(Debug, Error)]
pub enum CtftimeError {
    #[error("Start must be before finish")]
    InvalidRange,
    #[error("Not found upstream")]
    NotFound,
    #[error("CTFtime API error: {0}")]
    Api(String),
}

/// Upcoming event as listed on CTFtime. Read-only and never persisted;
/// independent of any HTTP or Discord types.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub ctftime_url: String,
    pub logo: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub finish: Option<DateTime<Utc>>,
    pub weight: f64,
}

/// Competing team, used only for rendering.
#[derive(Debug, Clone)]
pub struct Team {
    pub id: u64,
    pub primary_alias: String,
    pub logo: Option<String>,
    /// Year → standing for that year.
    pub rating: HashMap<String, TeamRating>,
}

#[derive(Debug, Clone)]
pub struct TeamRating {
    pub place: Option<u64>,
    pub points: Option<f64>,
}

/// Trait describing the three read-only CTFtime calls the bot needs.
#[async_trait]
pub trait CtftimeClient: Send + Sync {
    async fn list_events(
        &self,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Event>, CtftimeError>;
    async fn get_event(&self, event_id: u64) -> Result<Event, CtftimeError>;
    async fn get_team(&self, team_id: u64) -> Result<Team, CtftimeError>;
}

/// Thin service over the client that owns range defaulting and validation,
/// so command handlers never hand an inverted window to the network layer.
pub struct CtftimeService<C: CtftimeClient> {
    client: C,
}

impl<C: CtftimeClient> CtftimeService<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Events whose window intersects `[start, finish]`. `start` defaults to
    /// now, `finish` to a week later. An inverted range fails before any
    /// network call is made.
    pub async fn upcoming(
        &self,
        start: Option<DateTime<Utc>>,
        finish: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Event>, CtftimeError> {
        let start = start.unwrap_or_else(Utc::now);
        let finish = finish.unwrap_or(start + Duration::weeks(1));
        if start >= finish {
            return Err(CtftimeError::InvalidRange);
        }

        self.client.list_events(start, finish, limit).await
    }

    pub async fn event(&self, event_id: u64) -> Result<Event, CtftimeError> {
        self.client.get_event(event_id).await
    }

    pub async fn team(&self, team_id: u64) -> Result<Team, CtftimeError> {
        self.client.get_team(team_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records the windows it was asked for; returns no events.
    #[derive(Default)]
    struct RecordingClient {
        calls: AtomicUsize,
        windows: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
    }

    #[async_trait]
    impl CtftimeClient for RecordingClient {
        async fn list_events(
            &self,
            start: DateTime<Utc>,
            finish: DateTime<Utc>,
            _limit: usize,
        ) -> Result<Vec<Event>, CtftimeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.windows.lock().unwrap().push((start, finish));
            Ok(Vec::new())
        }

        async fn get_event(&self, _event_id: u64) -> Result<Event, CtftimeError> {
            Err(CtftimeError::NotFound)
        }

        async fn get_team(&self, _team_id: u64) -> Result<Team, CtftimeError> {
            Err(CtftimeError::NotFound)
        }
    }

    #[tokio::test]
    async fn inverted_range_fails_without_a_network_call() {
        let service = CtftimeService::new(RecordingClient::default());
        let now = Utc::now();

        let result = service
            .upcoming(Some(now), Some(now - Duration::hours(1)), 100)
            .await;
        assert!(matches!(result, Err(CtftimeError::InvalidRange)));

        let result = service.upcoming(Some(now), Some(now), 100).await;
        assert!(matches!(result, Err(CtftimeError::InvalidRange)));

        assert_eq!(service.client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn finish_defaults_to_one_week_after_start() {
        let service = CtftimeService::new(RecordingClient::default());
        let start = Utc::now();

        let events = service.upcoming(Some(start), None, 100).await.unwrap();
        assert!(events.is_empty());

        let windows = service.client.windows.lock().unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].0, start);
        assert_eq!(windows[0].1, start + Duration::weeks(1));
    }

    #[tokio::test]
    async fn not_found_passes_through() {
        let service = CtftimeService::new(RecordingClient::default());
        assert!(matches!(
            service.event(99999).await,
            Err(CtftimeError::NotFound)
        ));
        assert!(matches!(
            service.team(99999).await,
            Err(CtftimeError::NotFound)
        ));
    }
}
