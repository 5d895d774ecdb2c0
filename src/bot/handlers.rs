use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::info;

use crate::{bot::AriaBot, ui::embeds};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &AriaBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, command, bot, guild_id).await?,
        _ => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ Comando no reconocido")
                            .ephemeral(true),
                    ),
                )
                .await?;
        }
    }

    Ok(())
}

async fn handle_play(
    ctx: &Context,
    command: CommandInteraction,
    bot: &AriaBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?
        .to_string();

    // Defer: resolver y abrir el stream puede tardar más de 3 segundos
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let Some(voice_channel) = user_voice_channel(ctx, guild_id, command.user.id) else {
        command
            .edit_response(
                &ctx.http,
                EditInteractionResponse::new()
                    .embed(embeds::create_error_embed("Debes estar en un canal de voz")),
            )
            .await?;
        return Ok(());
    };

    let response = match bot
        .playback
        .enqueue(guild_id, voice_channel, &query, &command.user.name)
        .await
    {
        Ok(enqueued) => EditInteractionResponse::new().embed(embeds::create_enqueued_embed(&enqueued)),
        Err(e) => EditInteractionResponse::new().embed(embeds::create_error_embed(&e.to_string())),
    };

    command.edit_response(&ctx.http, response).await?;
    Ok(())
}

async fn handle_skip(
    ctx: &Context,
    command: CommandInteraction,
    bot: &AriaBot,
    guild_id: GuildId,
) -> Result<()> {
    let message = match bot.playback.skip(guild_id).await {
        Ok(track) => CreateInteractionResponseMessage::new().embed(embeds::create_skipped_embed(&track)),
        Err(e) => CreateInteractionResponseMessage::new()
            .embed(embeds::create_error_embed(&e.to_string()))
            .ephemeral(true),
    };

    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;
    Ok(())
}

async fn handle_stop(
    ctx: &Context,
    command: CommandInteraction,
    bot: &AriaBot,
    guild_id: GuildId,
) -> Result<()> {
    let message = match bot.playback.stop(guild_id).await {
        Ok(()) => CreateInteractionResponseMessage::new().embed(embeds::create_stopped_embed()),
        Err(e) => CreateInteractionResponseMessage::new()
            .embed(embeds::create_error_embed(&e.to_string()))
            .ephemeral(true),
    };

    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;
    Ok(())
}

async fn handle_queue(
    ctx: &Context,
    command: CommandInteraction,
    bot: &AriaBot,
    guild_id: GuildId,
) -> Result<()> {
    let snapshot = bot.playback.snapshot(guild_id).await;

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embeds::create_queue_embed(&snapshot)),
            ),
        )
        .await?;
    Ok(())
}

// Funciones auxiliares

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
