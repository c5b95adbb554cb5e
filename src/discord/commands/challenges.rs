// Challenge board commands: challenge, remove, solve.
//
// The persisted board is the source of truth; the board message in the
// challenges channel is regenerated after every mutation.

use poise::serenity_prelude as serenity;

use crate::core::ctf::{validate_name, ChallengeBoard, CtfError};
use crate::discord::commands::ctf::{Context, Error};
use crate::discord::embeds;

/// Re-render the board message, posting it on first use and editing it
/// afterwards.
async fn sync_board(
    ctx: Context<'_>,
    guild_id: u64,
    event_id: u64,
    channel_id: u64,
    board: &ChallengeBoard,
) -> Result<(), Error> {
    let http = &ctx.serenity_context().http;
    let channel = serenity::ChannelId::new(channel_id);
    let embed = embeds::board_embed(board);

    match board.message_id {
        Some(message_id) => {
            channel
                .edit_message(
                    http,
                    serenity::MessageId::new(message_id),
                    serenity::EditMessage::new().embed(embed),
                )
                .await?;
        }
        None => {
            let message = channel
                .send_message(http, serenity::CreateMessage::new().embed(embed))
                .await?;
            ctx.data()
                .ctf
                .set_board_message(guild_id, event_id, message.id.get())
                .await?;
        }
    }
    Ok(())
}

/// Add a challenge to this CTF's board and open a thread for it.
#[poise::command(slash_command, guild_only)]
pub async fn challenge(
    ctx: Context<'_>,
    #[description = "Category, e.g. pwn or web"] category: String,
    #[description = "Challenge name"] name: String,
) -> Result<(), Error> {
    ctx.defer().await?;
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    if let Err(e) = validate_name(&category).and_then(|_| validate_name(&name)) {
        ctx.say(e.to_string()).await?;
        return Ok(());
    }

    let Some((event_id, workspace)) = ctx
        .data()
        .ctf
        .workspace_by_challenges_channel(guild_id, ctx.channel_id().get())
        .await
    else {
        ctx.say("This is not a CTF channel").await?;
        return Ok(());
    };

    // Check before creating the thread so a duplicate leaves nothing behind.
    if ctx
        .data()
        .ctf
        .challenge_exists(guild_id, event_id, &category, &name)
        .await
    {
        ctx.say(format!("Challenge '{name}' already exists")).await?;
        return Ok(());
    }

    let http = &ctx.serenity_context().http;
    let thread = serenity::ChannelId::new(workspace.challenges_channel_id)
        .create_thread(
            http,
            serenity::CreateThread::new(format!("{category}-{name}"))
                .kind(serenity::ChannelType::PublicThread),
        )
        .await?;

    let board = match ctx
        .data()
        .ctf
        .add_challenge(guild_id, event_id, &category, &name, thread.id.get())
        .await
    {
        Ok(board) => board,
        Err(e @ (CtfError::DuplicateChallenge(_) | CtfError::InvalidName(_))) => {
            ctx.say(e.to_string()).await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    sync_board(
        ctx,
        guild_id,
        event_id,
        workspace.challenges_channel_id,
        &board,
    )
    .await?;
    ctx.say(format!(
        "Added `{name}` under `{category}`: <#{}>",
        thread.id
    ))
    .await?;
    Ok(())
}

/// Remove an unsolved challenge from this CTF's board.
#[poise::command(slash_command, guild_only)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Challenge name"] name: String,
) -> Result<(), Error> {
    ctx.defer().await?;
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    let Some((event_id, workspace)) = ctx
        .data()
        .ctf
        .workspace_by_challenges_channel(guild_id, ctx.channel_id().get())
        .await
    else {
        ctx.say("This is not a CTF channel").await?;
        return Ok(());
    };

    match ctx
        .data()
        .ctf
        .remove_challenge(guild_id, event_id, &name)
        .await
    {
        Ok(board) => {
            sync_board(
                ctx,
                guild_id,
                event_id,
                workspace.challenges_channel_id,
                &board,
            )
            .await?;
            ctx.say(format!("Removed challenge `{name}`")).await?;
        }
        Err(CtfError::UnknownChallenge(_)) => {
            ctx.say(format!("No challenge named '{name}'")).await?;
        }
        Err(CtfError::AlreadySolved) => {
            ctx.say("Solved challenges stay on the board.").await?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Mark the challenge owning this thread as solved.
#[poise::command(slash_command, guild_only)]
pub async fn solve(
    ctx: Context<'_>,
    #[description = "The flag you captured"] flag: String,
    #[description = "Show the flag in the announcement"] reveal: Option<bool>,
) -> Result<(), Error> {
    ctx.defer().await?;
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();
    let solver = ctx.author().name.clone();

    let (event_id, board) = match ctx
        .data()
        .ctf
        .solve_challenge(guild_id, ctx.channel_id().get(), &solver)
        .await
    {
        Ok(result) => result,
        Err(CtfError::UnknownThread) => {
            ctx.say("This is not a CTF thread").await?;
            return Ok(());
        }
        Err(CtfError::AlreadySolved) => {
            ctx.say("This challenge has already been solved!").await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(workspace) = ctx.data().ctf.workspace(guild_id, event_id).await {
        sync_board(
            ctx,
            guild_id,
            event_id,
            workspace.challenges_channel_id,
            &board,
        )
        .await?;
    }

    let shown = if reveal.unwrap_or(false) {
        format!("`{flag}`")
    } else {
        "||hidden||".to_string()
    };
    ctx.say(format!("🎉 {solver} solved it! Flag: {shown}"))
        .await?;
    Ok(())
}
