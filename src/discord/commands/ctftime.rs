// Read-and-render commands against the CTFtime API: upcoming, event, team.

use chrono::{Duration, Utc};

use crate::core::ctftime::CtftimeError;
use crate::discord::commands::ctf::{Context, Error};
use crate::discord::embeds;

/// List CTFtime events starting soon.
#[poise::command(slash_command, guild_only)]
pub async fn upcoming(
    ctx: Context<'_>,
    #[description = "How many days ahead to look (default 7)"] days: Option<u32>,
) -> Result<(), Error> {
    ctx.defer().await?;

    let finish = days.map(|d| Utc::now() + Duration::days(d as i64));
    let events = match ctx.data().ctftime.upcoming(None, finish, 100).await {
        Ok(events) => events,
        Err(CtftimeError::InvalidRange) => {
            ctx.say("That range is empty. Try at least one day.").await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let window = match days {
        Some(d) => format!("{d} days"),
        None => "week".to_string(),
    };
    ctx.say(format!(
        "Found {} events in the next {}:",
        events.len(),
        window
    ))
    .await?;

    for event in &events {
        ctx.send(poise::CreateReply::default().embed(embeds::event_embed(event)))
            .await?;
    }
    Ok(())
}

/// Look up one CTFtime event by id.
#[poise::command(slash_command, guild_only)]
pub async fn event(
    ctx: Context<'_>,
    #[description = "CTFtime event id"] event_id: u64,
) -> Result<(), Error> {
    ctx.defer().await?;

    match ctx.data().ctftime.event(event_id).await {
        Ok(event) => {
            ctx.send(poise::CreateReply::default().embed(embeds::event_embed(&event)))
                .await?;
        }
        Err(CtftimeError::NotFound) => {
            ctx.say(format!("No CTFtime event with id {event_id} was found."))
                .await?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Look up one CTFtime team by id.
#[poise::command(slash_command, guild_only)]
pub async fn team(
    ctx: Context<'_>,
    #[description = "CTFtime team id"] team_id: u64,
) -> Result<(), Error> {
    ctx.defer().await?;

    match ctx.data().ctftime.team(team_id).await {
        Ok(team) => {
            ctx.send(poise::CreateReply::default().embed(embeds::team_embed(&team)))
                .await?;
        }
        Err(CtftimeError::NotFound) => {
            ctx.say(format!("No CTFtime team with id {team_id} was found."))
                .await?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
