// Embed builders shared by commands and event handlers. All of them render
// from core models; nothing in here is ever parsed back.

use poise::serenity_prelude as serenity;

use crate::core::ctf::{BoardItem, ChallengeBoard};
use crate::core::ctftime::{Event, Team};

/// Weights at or below this are noise on CTFtime and would show a misleading
/// rank weight.
const WEIGHT_EPSILON: f64 = 1e-9;

fn pretty_time(time: Option<chrono::DateTime<chrono::Utc>>) -> String {
    match time {
        Some(t) => t.format("%B %d at %I%p").to_string(),
        None => "Unknown".to_string(),
    }
}

/// Summary card for one CTFtime event.
pub fn event_embed(event: &Event) -> serenity::CreateEmbed {
    let mut embed = serenity::CreateEmbed::new()
        .title(format!("{} — {}", event.title, event.id))
        .description(&event.description)
        .url(&event.ctftime_url)
        .field("Start", pretty_time(event.start), true)
        .field("Finish", pretty_time(event.finish), true);

    if let Some(logo) = &event.logo {
        embed = embed.thumbnail(logo);
    }
    if event.weight > WEIGHT_EPSILON {
        embed = embed.field("Weight", event.weight.to_string(), true);
    }

    embed
}

/// Year/Rank/Points columns for a team, one line per rated year.
pub fn team_columns(team: &Team) -> (String, String, String) {
    let mut years: Vec<&String> = team.rating.keys().collect();
    years.sort();

    let mut year_col = String::new();
    let mut rank_col = String::new();
    let mut points_col = String::new();
    for year in years {
        let rating = &team.rating[year];
        year_col.push_str(year);
        year_col.push('\n');
        if let Some(place) = rating.place {
            rank_col.push_str(&place.to_string());
        }
        rank_col.push('\n');
        if let Some(points) = rating.points {
            points_col.push_str(&format!("{points:.1}"));
        }
        points_col.push('\n');
    }

    (year_col, rank_col, points_col)
}

pub fn team_embed(team: &Team) -> serenity::CreateEmbed {
    let mut embed = serenity::CreateEmbed::new().title(&team.primary_alias);

    if !team.rating.is_empty() {
        let (years, ranks, points) = team_columns(team);
        embed = embed
            .field("Year", years, true)
            .field("Rank", ranks, true)
            .field("Points", points, true);
    }
    if let Some(logo) = &team.logo {
        embed = embed.thumbnail(logo);
    }

    embed
}

/// (name, value) embed fields for a challenge board. Category headers carry
/// emphasis markers; solved entries are struck through and credited.
pub fn board_fields(board: &ChallengeBoard) -> Vec<(String, String)> {
    board
        .items
        .iter()
        .map(|item| match item {
            BoardItem::Category { name } => (format!("*{name}*"), "\u{200b}".to_string()),
            BoardItem::Challenge {
                name,
                thread_id,
                solved,
                solver,
            } => {
                let entry = format!("{name} → <#{thread_id}>");
                let value = if *solved {
                    let solver = solver.as_deref().unwrap_or("someone");
                    format!("~~{entry}~~ has been solved by {solver}!")
                } else {
                    entry
                };
                (name.clone(), value)
            }
        })
        .collect()
}

pub fn board_embed(board: &ChallengeBoard) -> serenity::CreateEmbed {
    let embed = serenity::CreateEmbed::new().title("Challenges");
    if board.items.is_empty() {
        return embed.description("No challenges yet. Add one with `/challenge`.");
    }

    embed.fields(
        board_fields(board)
            .into_iter()
            .map(|(name, value)| (name, value, false)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn pretty_time_matches_the_classic_format() {
        let t = Utc.with_ymd_and_hms(2022, 7, 30, 17, 0, 0).unwrap();
        assert_eq!(pretty_time(Some(t)), "July 30 at 05PM");
        assert_eq!(pretty_time(None), "Unknown");
    }

    #[test]
    fn board_fields_render_headers_entries_and_solves() {
        let board = ChallengeBoard {
            message_id: None,
            items: vec![
                BoardItem::Category {
                    name: "pwn".to_string(),
                },
                BoardItem::Challenge {
                    name: "heapnote".to_string(),
                    thread_id: 500,
                    solved: false,
                    solver: None,
                },
                BoardItem::Challenge {
                    name: "rop".to_string(),
                    thread_id: 501,
                    solved: true,
                    solver: Some("ada".to_string()),
                },
            ],
        };

        let fields = board_fields(&board);
        assert_eq!(fields[0].0, "*pwn*");
        assert_eq!(fields[1].1, "heapnote → <#500>");
        assert_eq!(fields[2].1, "~~rop → <#501>~~ has been solved by ada!");
    }

    #[test]
    fn team_columns_are_sorted_by_year_with_gaps_kept() {
        use crate::core::ctftime::TeamRating;
        use std::collections::HashMap;

        let mut rating = HashMap::new();
        rating.insert(
            "2022".to_string(),
            TeamRating {
                place: Some(3),
                points: Some(120.5),
            },
        );
        rating.insert(
            "2021".to_string(),
            TeamRating {
                place: None,
                points: None,
            },
        );
        let team = Team {
            id: 1,
            primary_alias: "wolvsec".to_string(),
            logo: None,
            rating,
        };

        let (years, ranks, points) = team_columns(&team);
        assert_eq!(years, "2021\n2022\n");
        assert_eq!(ranks, "\n3\n");
        assert_eq!(points, "\n120.5\n");
    }
}
