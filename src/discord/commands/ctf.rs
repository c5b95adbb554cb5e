// Event lifecycle commands: register, archive, print_events,
// set_event_category_id, remove_event, reminder.
//
// **Notice the pattern:**
// 1. Extract primitive data from Discord types
// 2. Call core service
// 3. Format the response based on the result
//
// This layer is THIN - no business logic, just translation.

use std::sync::Arc;

use poise::serenity_prelude as serenity;

use crate::core::ctf::{CtfError, CtfService, Workspace};
use crate::core::ctftime::{CtftimeError, CtftimeService, Event};
use crate::discord::embeds;
use crate::infra::ctftime::ctftime_client::CtftimeApiClient;
use crate::infra::state::JsonStateStore;

/// Environment-sourced ids the command layer needs. Opaque snowflakes;
/// no validation beyond "present and numeric" happens here.
#[derive(Debug, Clone, Copy)]
pub struct BotConfig {
    pub ctf_category_id: u64,
    pub archive_category_id: u64,
    pub verified_role_id: u64,
}

/// Shared state handle passed into every command handler.
pub struct Data {
    pub ctf: Arc<CtfService<JsonStateStore>>,
    pub ctftime: Arc<CtftimeService<CtftimeApiClient>>,
    pub config: BotConfig,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Register a CTFtime event and create its workspace channels.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn register(
    ctx: Context<'_>,
    #[description = "CTFtime event id"] event_id: u64,
    #[description = "Name for the event channels"] name: String,
) -> Result<(), Error> {
    ctx.defer().await?;
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?;

    match ctx.data().ctf.check_registrable(guild_id.get(), event_id).await {
        Ok(()) => {}
        Err(CtfError::AlreadyRegistered(_)) | Err(CtfError::AlreadyPlayed(_)) => {
            ctx.say("You have already registered/played this event!")
                .await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    let event = match ctx.data().ctftime.event(event_id).await {
        Ok(event) => event,
        Err(CtftimeError::NotFound) => {
            ctx.say(format!("No CTFtime event with id {event_id} was found."))
                .await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    // Per-guild category override wins over the environment default.
    let category_id = ctx
        .data()
        .ctf
        .event_category(guild_id.get())
        .await
        .unwrap_or(ctx.data().config.ctf_category_id);

    let workspace =
        create_workspace(ctx, guild_id, serenity::ChannelId::new(category_id), &name, &event)
            .await?;
    let join_channel_id = workspace.join_channel_id;

    ctx.data()
        .ctf
        .record_registration(guild_id.get(), event_id, workspace)
        .await?;

    ctx.say(format!(
        "Registered **{}**! Head to <#{}> and react to join.",
        event.title, join_channel_id
    ))
    .await?;
    Ok(())
}

/// Create the join/logs/challenges/general channels for one event. The
/// internal channels start hidden; the join reaction opens them up per
/// member. Failing partway leaves orphaned channels behind, which is an
/// accepted limitation.
async fn create_workspace(
    ctx: Context<'_>,
    guild_id: serenity::GuildId,
    category_id: serenity::ChannelId,
    name: &str,
    event: &Event,
) -> Result<Workspace, Error> {
    let http = &ctx.serenity_context().http;
    let everyone = serenity::RoleId::new(guild_id.get());
    let hidden = || {
        vec![serenity::PermissionOverwrite {
            allow: serenity::Permissions::empty(),
            deny: serenity::Permissions::VIEW_CHANNEL,
            kind: serenity::PermissionOverwriteType::Role(everyone),
        }]
    };

    let join = guild_id
        .create_channel(
            http,
            serenity::CreateChannel::new(format!("{name}-join"))
                .kind(serenity::ChannelType::Text)
                .category(category_id),
        )
        .await?;
    let logs = guild_id
        .create_channel(
            http,
            serenity::CreateChannel::new(format!("{name}-logs"))
                .kind(serenity::ChannelType::Text)
                .category(category_id)
                .permissions(hidden()),
        )
        .await?;
    let challenges = guild_id
        .create_channel(
            http,
            serenity::CreateChannel::new(format!("{name}-challenges"))
                .kind(serenity::ChannelType::Text)
                .category(category_id)
                .permissions(hidden()),
        )
        .await?;
    let general = guild_id
        .create_channel(
            http,
            serenity::CreateChannel::new(format!("{name}-general"))
                .kind(serenity::ChannelType::Text)
                .category(category_id)
                .permissions(hidden()),
        )
        .await?;

    let summary = join
        .send_message(
            http,
            serenity::CreateMessage::new().embed(embeds::event_embed(event)),
        )
        .await?;
    summary.pin(http).await?;

    let join_message = join
        .send_message(
            http,
            serenity::CreateMessage::new()
                .content("React with 🚩 to join this CTF and unlock its channels!"),
        )
        .await?;
    join_message
        .react(http, serenity::ReactionType::Unicode("🚩".to_string()))
        .await?;

    Ok(Workspace {
        join_channel_id: join.id.get(),
        logs_channel_id: logs.id.get(),
        challenges_channel_id: challenges.id.get(),
        general_channel_id: general.id.get(),
        join_message_id: Some(join_message.id.get()),
        event_start: event.start,
    })
}

/// Archive the CTF the invoking channel belongs to.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn archive(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    // Find the match first; the mutation happens inside the service.
    let Some((event_id, workspace)) = ctx
        .data()
        .ctf
        .find_active_event(guild_id, ctx.channel_id().get())
        .await
    else {
        ctx.say("Current channel is not an active CTF").await?;
        return Ok(());
    };

    let http = &ctx.serenity_context().http;
    let archive_category = serenity::ChannelId::new(ctx.data().config.archive_category_id);
    for channel_id in [
        workspace.join_channel_id,
        workspace.logs_channel_id,
        workspace.challenges_channel_id,
        workspace.general_channel_id,
    ] {
        serenity::ChannelId::new(channel_id)
            .edit(
                http,
                serenity::EditChannel::new().category(Some(archive_category)),
            )
            .await?;
    }

    ctx.data().ctf.archive_event(guild_id, event_id).await?;
    ctx.say("Done!").await?;
    Ok(())
}

/// List the events registered in this guild.
#[poise::command(slash_command, guild_only)]
pub async fn print_events(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    let events = ctx.data().ctf.registered_events(guild_id).await;
    if events.is_empty() {
        ctx.say("No upcoming events at the moment").await?;
        return Ok(());
    }

    let description = events
        .iter()
        .map(|(event_id, ws)| format!("`{event_id}` <#{}>", ws.join_channel_id))
        .collect::<Vec<_>>()
        .join("\n");
    let embed = serenity::CreateEmbed::new()
        .title("Upcoming registered events")
        .description(description);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Override the category new event channels are created under.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn set_event_category_id(
    ctx: Context<'_>,
    #[description = "Category id for new event channels"] category_id: u64,
) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    ctx.data()
        .ctf
        .set_event_category(guild_id, category_id)
        .await?;
    ctx.say(format!(
        "New event channels will be created under <#{category_id}>."
    ))
    .await?;
    Ok(())
}

/// Unregister an event without archiving it. The channels are left in place.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn remove_event(
    ctx: Context<'_>,
    #[description = "CTFtime event id"] event_id: u64,
) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    match ctx.data().ctf.remove_event(guild_id, event_id).await {
        Ok(_) => {
            ctx.say(format!(
                "Removed event {event_id}. Its channels were left in place."
            ))
            .await?;
        }
        Err(CtfError::NotRegistered(_)) => {
            ctx.say(format!("Event {event_id} is not registered."))
                .await?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Toggle a start-time reminder for the CTF owning this channel.
#[poise::command(slash_command, guild_only)]
pub async fn reminder(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    let Some((_, workspace)) = ctx
        .data()
        .ctf
        .find_active_event(guild_id, ctx.channel_id().get())
        .await
    else {
        ctx.say("Current channel is not an active CTF").await?;
        return Ok(());
    };

    let Some(start) = workspace.event_start else {
        ctx.say("This event has no start time to remind about.")
            .await?;
        return Ok(());
    };

    let added = ctx
        .data()
        .ctf
        .toggle_reminder(guild_id, workspace.join_channel_id, start)
        .await?;
    if added {
        ctx.say("Added reminder for this event").await?;
    } else {
        ctx.say("Removed reminder for this event").await?;
    }
    Ok(())
}
