// Join-reaction listeners. A flag reaction on a workspace's join message
// opens the internal channels for that member; removing it closes them
// again. Both directions are idempotent: re-granting an existing overwrite
// and deleting an absent one are no-ops upstream.

use poise::serenity_prelude::{self as serenity, Mentionable};

use crate::discord::commands::ctf::{Data, Error};

pub async fn handle_reaction_add(
    ctx: &serenity::Context,
    data: &Data,
    reaction: &serenity::Reaction,
) -> Result<(), Error> {
    let Some(guild_id) = reaction.guild_id else {
        return Ok(());
    };
    let user = reaction.user(&ctx.http).await?;
    if user.bot {
        return Ok(());
    }

    let Some((_, workspace)) = data
        .ctf
        .workspace_by_join_message(
            guild_id.get(),
            reaction.channel_id.get(),
            reaction.message_id.get(),
        )
        .await
    else {
        return Ok(());
    };

    let member = guild_id.member(&ctx.http, user.id).await?;
    let verified = serenity::RoleId::new(data.config.verified_role_id);
    if !member.roles.contains(&verified) {
        // Best effort; the user may have DMs closed.
        let _ = user
            .dm(
                &ctx.http,
                serenity::CreateMessage::new().content(
                    "You need the verified role before joining a CTF. \
                     Ask a moderator to verify you.",
                ),
            )
            .await;
        return Ok(());
    }

    for channel_id in workspace.internal_channels() {
        serenity::ChannelId::new(channel_id)
            .create_permission(
                &ctx.http,
                serenity::PermissionOverwrite {
                    allow: serenity::Permissions::VIEW_CHANNEL
                        | serenity::Permissions::SEND_MESSAGES,
                    deny: serenity::Permissions::empty(),
                    kind: serenity::PermissionOverwriteType::Member(user.id),
                },
            )
            .await?;
    }

    serenity::ChannelId::new(workspace.general_channel_id)
        .say(&ctx.http, format!("{} joined the CTF!", user.mention()))
        .await?;
    Ok(())
}

pub async fn handle_reaction_remove(
    ctx: &serenity::Context,
    data: &Data,
    reaction: &serenity::Reaction,
) -> Result<(), Error> {
    let Some(guild_id) = reaction.guild_id else {
        return Ok(());
    };
    let user = reaction.user(&ctx.http).await?;
    if user.bot {
        return Ok(());
    }

    let Some((_, workspace)) = data
        .ctf
        .workspace_by_join_message(
            guild_id.get(),
            reaction.channel_id.get(),
            reaction.message_id.get(),
        )
        .await
    else {
        return Ok(());
    };

    for channel_id in workspace.internal_channels() {
        serenity::ChannelId::new(channel_id)
            .delete_permission(
                &ctx.http,
                serenity::PermissionOverwriteType::Member(user.id),
            )
            .await?;
    }

    serenity::ChannelId::new(workspace.general_channel_id)
        .say(&ctx.http, format!("{} left the CTF.", user.name))
        .await?;
    Ok(())
}
