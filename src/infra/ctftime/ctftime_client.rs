use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::core::ctftime::{CtftimeClient, CtftimeError, Event, Team, TeamRating};

const USER_AGENT: &str = "WolvSec Discord Bot/0.2.0";

/// Minimal CTFtime REST client. It deliberately exposes only the three
/// read-only calls the core layer needs. Every request carries the fixed
/// user-agent and a 10 second timeout; call volume is bounded by
/// human-issued commands, so there is no retry or caching layer.
pub struct CtftimeApiClient {
    client: Client,
    base_url: String,
}

impl CtftimeApiClient {
    pub fn new() -> Result<Self, CtftimeError> {
        let mut headers = HeaderMap::new();
        headers.insert("User-Agent", HeaderValue::from_static(USER_AGENT));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CtftimeError::Api(e.to_string()))?;

        Ok(Self {
            client,
            base_url: "https://ctftime.org/api/v1".to_string(),
        })
    }

    fn parse_datetime(value: Option<String>) -> Option<DateTime<Utc>> {
        value
            .as_deref()
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn map_event(api: ApiEvent) -> Event {
        Event {
            id: api.id.unwrap_or_default(),
            title: api.title.unwrap_or_else(|| "Untitled event".to_string()),
            description: api.description.unwrap_or_default(),
            ctftime_url: api
                .ctftime_url
                .unwrap_or_else(|| "https://ctftime.org".to_string()),
            logo: api.logo.filter(|l| !l.is_empty()),
            start: Self::parse_datetime(api.start),
            finish: Self::parse_datetime(api.finish),
            weight: api.weight.unwrap_or_default(),
        }
    }

    fn map_team(api: ApiTeam) -> Team {
        Team {
            id: api.id.unwrap_or_default(),
            primary_alias: api
                .primary_alias
                .or(api.name)
                .unwrap_or_else(|| "Unknown team".to_string()),
            logo: api.logo.filter(|l| !l.is_empty()),
            rating: api
                .rating
                .unwrap_or_default()
                .into_iter()
                .map(|(year, r)| {
                    (
                        year,
                        TeamRating {
                            place: r.rating_place,
                            points: r.rating_points,
                        },
                    )
                })
                .collect(),
        }
    }
}

#[async_trait]
impl CtftimeClient for CtftimeApiClient {
    async fn list_events(
        &self,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Event>, CtftimeError> {
        let url = format!("{}/events/", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("limit", limit.to_string()),
                ("start", start.timestamp().to_string()),
                ("finish", finish.timestamp().to_string()),
            ])
            .send()
            .await
            .map_err(|e| CtftimeError::Api(e.to_string()))?;

        if resp.status().is_success() {
            let events: Vec<ApiEvent> = resp
                .json()
                .await
                .map_err(|e| CtftimeError::Api(e.to_string()))?;
            Ok(events.into_iter().map(Self::map_event).collect())
        } else {
            Err(CtftimeError::Api(format!(
                "CTFtime returned {} for event list",
                resp.status()
            )))
        }
    }

    async fn get_event(&self, event_id: u64) -> Result<Event, CtftimeError> {
        let url = format!("{}/events/{}/", self.base_url, event_id);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CtftimeError::Api(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(CtftimeError::NotFound);
        }

        if resp.status().is_success() {
            let event: ApiEvent = resp
                .json()
                .await
                .map_err(|e| CtftimeError::Api(e.to_string()))?;
            Ok(Self::map_event(event))
        } else {
            Err(CtftimeError::Api(format!(
                "CTFtime returned {} for event {}",
                resp.status(),
                event_id
            )))
        }
    }

    async fn get_team(&self, team_id: u64) -> Result<Team, CtftimeError> {
        let url = format!("{}/teams/{}/", self.base_url, team_id);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CtftimeError::Api(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(CtftimeError::NotFound);
        }

        if resp.status().is_success() {
            let team: ApiTeam = resp
                .json()
                .await
                .map_err(|e| CtftimeError::Api(e.to_string()))?;
            Ok(Self::map_team(team))
        } else {
            Err(CtftimeError::Api(format!(
                "CTFtime returned {} for team {}",
                resp.status(),
                team_id
            )))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiEvent {
    id: Option<u64>,
    title: Option<String>,
    description: Option<String>,
    ctftime_url: Option<String>,
    logo: Option<String>,
    start: Option<String>,
    finish: Option<String>,
    weight: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ApiTeam {
    id: Option<u64>,
    primary_alias: Option<String>,
    name: Option<String>,
    logo: Option<String>,
    rating: Option<HashMap<String, ApiRating>>,
}

#[derive(Debug, Deserialize)]
struct ApiRating {
    rating_place: Option<u64>,
    rating_points: Option<f64>,
}
