//! # Bot Module
//!
//! Discord-facing layer of Aria Music: command registration, interaction
//! dispatch and voice-state bookkeeping. All playback decisions are
//! delegated to [`crate::player::Playback`]; this module only translates
//! between Discord interactions and the playback engine.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{config::Config, player::Playback};

/// Main Discord event handler.
///
/// Owns the shared [`Playback`] engine and wires Discord events into it:
/// slash commands become queue operations, and a forced disconnect of the
/// bot tears the guild's state down.
pub struct AriaBot {
    config: Arc<Config>,
    pub playback: Arc<Playback>,
}

impl AriaBot {
    pub fn new(config: Arc<Config>, playback: Arc<Playback>) -> Self {
        Self { config, playback }
    }

    /// Registra los comandos slash, globales o por guild según configuración.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🤖 Bot ID: {}", ctx.cache.current_user().id);
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild configurada: {guild_id}");
                    return Ok(());
                }
                commands::register_guild_commands(ctx, guild_id).await?;
                info!("✅ Comandos registrados para guild {guild_id}");
            }
            None => {
                commands::register_global_commands(ctx).await?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for AriaBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {e:?}");
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                error!("Error manejando comando: {e:?}");
            }
        }
    }

    /// Una desconexión forzada del bot (expulsión o mudanza externa) debe
    /// sanear el estado de la guild igual que un `/stop`.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id {
            return;
        }

        if old.is_some() && new.channel_id.is_none() {
            if let Some(guild_id) = new.guild_id {
                info!("🔌 Bot desconectado del canal de voz en guild {guild_id}");
                self.playback.teardown(guild_id).await;
            }
        }
    }
}
