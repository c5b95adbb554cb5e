// This is the entry point of the Discord bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (HTTP API, state file)
// - `discord/` = Discord-specific adapters (commands, events)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Register commands and event handlers

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use std::sync::Arc;

use poise::serenity_prelude as serenity;

use crate::core::ctf::CtfService;
use crate::core::ctftime::CtftimeService;
use crate::discord::commands::ctf::BotConfig;
use crate::discord::reactions;
use crate::discord::{Data, Error};
use crate::infra::ctftime::ctftime_client::CtftimeApiClient;
use crate::infra::state::JsonStateStore;

/// Event handler for non-command Discord events. Join reactions are the only
/// ones we care about.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::ReactionAdd { add_reaction } => {
            if let Err(e) = reactions::handle_reaction_add(ctx, data, add_reaction).await {
                tracing::error!("Error handling join reaction: {}", e);
            }
        }
        serenity::FullEvent::ReactionRemove { removed_reaction } => {
            if let Err(e) = reactions::handle_reaction_remove(ctx, data, removed_reaction).await {
                tracing::error!("Error handling leave reaction: {}", e);
            }
        }
        _ => {}
    }

    Ok(())
}

/// Dispatch-boundary error hook. Anticipated errors are answered close to
/// the source with precise messages; whatever reaches this point gets a
/// generic reply so users never see a raw error chain.
async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            tracing::error!("Command '{}' failed: {}", ctx.command().name, error);
            let _ = ctx
                .say("An internal error occurred while running this command.")
                .await;
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                tracing::error!("Error while handling error: {}", e);
            }
        }
    }
}

fn env_snowflake(name: &str) -> u64 {
    std::env::var(name)
        .unwrap_or_else(|_| panic!("Missing {name} environment variable!"))
        .parse()
        .unwrap_or_else(|_| panic!("{name} must be a numeric id"))
}

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let token = std::env::var("DISCORD_TOKEN").expect(
        "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
    );
    let config = BotConfig {
        ctf_category_id: env_snowflake("CTF_CATEGORY_ID"),
        archive_category_id: env_snowflake("ARCHIVE_CATEGORY_ID"),
        verified_role_id: env_snowflake("VERIFIED_ROLE_ID"),
    };

    // Keep runtime state in a dedicated folder so the repo root stays tidy.
    let data_dir = "data";
    std::fs::create_dir_all(data_dir).expect("Failed to create data directory");
    let state_path = std::env::var("CTF_DATA_FILE")
        .unwrap_or_else(|_| format!("{}/ctf_state.json", data_dir));

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Create our services with their dependencies.
    // This is the "composition root" where we wire everything together.

    let store = JsonStateStore::new(&state_path);
    let ctf_service = Arc::new(
        CtfService::new(store)
            .await
            .expect("Failed to initialize CTF state"),
    );

    let ctftime_client = CtftimeApiClient::new().expect("Failed to create CTFtime API client");
    let ctftime_service = Arc::new(CtftimeService::new(ctftime_client));

    // Create the data structure that will be shared across all commands
    let data = Data {
        ctf: Arc::clone(&ctf_service),
        ctftime: Arc::clone(&ctftime_service),
        config,
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================
    // Configure the poise framework with our commands and settings.

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::GUILD_MESSAGE_REACTIONS
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            // Register all our commands here
            commands: vec![
                discord::commands::ctftime::upcoming(),
                discord::commands::ctftime::event(),
                discord::commands::ctftime::team(),
                discord::commands::ctf::register(),
                discord::commands::ctf::archive(),
                discord::commands::ctf::print_events(),
                discord::commands::ctf::set_event_category_id(),
                discord::commands::ctf::remove_event(),
                discord::commands::ctf::reminder(),
                discord::commands::challenges::challenge(),
                discord::commands::challenges::remove(),
                discord::commands::challenges::solve(),
            ],
            // Event handler for reactions
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                // Register slash commands globally (can take up to an hour to
                // propagate). For faster development, use register_in_guild.
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                tracing::info!("Commands registered, bot is ready");

                // Background reminder sweep. Runs every 60 seconds.
                let ctf = Arc::clone(&data.ctf);
                let http = ctx.http.clone();
                tokio::spawn(async move {
                    use std::time::Duration as StdDuration;
                    use tokio::time::sleep;

                    loop {
                        match ctf.due_reminders(chrono::Utc::now()).await {
                            Ok(due) => {
                                for (_, channel_id) in due {
                                    let channel = serenity::ChannelId::new(channel_id);
                                    if let Err(e) = channel
                                        .say(&http, "@here The CTF is starting now, good luck!")
                                        .await
                                    {
                                        tracing::warn!(
                                            "Failed to deliver reminder to {}: {}",
                                            channel_id,
                                            e
                                        );
                                    }
                                }
                            }
                            Err(err) => tracing::warn!("Reminder sweep failed: {}", err),
                        }

                        sleep(StdDuration::from_secs(60)).await;
                    }
                });

                Ok(data)
            })
        })
        .build();

    // Create the client and start the bot
    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .expect("Error creating client");

    client.start().await.expect("Error running bot");
}
