use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod bot;
mod config;
mod error;
mod player;
mod sources;
mod ui;

use crate::bot::AriaBot;
use crate::config::Config;
use crate::player::{session::SessionController, stream::YtDlpStreamOpener, Playback};
use crate::sources::SourceResolver;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("aria_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Aria Music v{}", env!("CARGO_PKG_VERSION"));

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    let config = Arc::new(Config::load()?);

    // Intents mínimos: interacciones y estados de voz
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    // Una sola instancia de Songbird compartida entre el cliente y el
    // controlador de sesiones de voz
    let songbird = Songbird::serenity();

    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();

    let sessions = Arc::new(SessionController::new(
        songbird.clone(),
        events_tx,
        config.connect_timeout,
        config.playback_volume,
    ));
    let resolver = Arc::new(SourceResolver::new(&config));
    let opener = Arc::new(YtDlpStreamOpener::new(config.youtube_cookie.clone()));

    let playback = Playback::new(resolver, opener, sessions);
    playback.spawn_event_loop(events_rx);

    let handler = AriaBot::new(config.clone(), playback);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Shutdown graceful
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Error al registrar Ctrl+C");
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        std::process::exit(0);
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {why:?}");
    }

    Ok(())
}

/// Verifica las dependencias externas del contenedor (`--health-check`).
async fn health_check() -> Result<()> {
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("yt-dlp no disponible");
    }
}
