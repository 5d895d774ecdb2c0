use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::Input, tracks::TrackHandle, CoreEvent, Event, EventContext,
    EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::error::PlayerError;

use super::PlaybackEvent;

/// Destino de audio por guild: establece la sesión de voz, acopla streams
/// y la desmonta. Es el único dueño del handle de transporte.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceSink: Send + Sync {
    /// Garantiza una sesión lista ligada a `channel`. Mover de canal es
    /// destruir y recrear, nunca religar in situ.
    async fn ensure(&self, guild: GuildId, channel: ChannelId) -> Result<(), PlayerError>;

    /// Acopla un stream ya sondeado a la sesión de la guild. Las señales de
    /// fin/error del track se emiten etiquetadas con `seq`.
    async fn play(&self, guild: GuildId, input: Input, seq: u64) -> Result<(), PlayerError>;

    /// Detiene el track en curso, si lo hay. Devuelve si había uno.
    async fn stop_current(&self, guild: GuildId) -> bool;

    /// Desmonta la sesión. Idempotente: sin sesión es un no-op.
    async fn teardown(&self, guild: GuildId);

    fn bound_channel(&self, guild: GuildId) -> Option<ChannelId>;
}

pub struct SessionController {
    songbird: Arc<Songbird>,
    bound: DashMap<GuildId, ChannelId>,
    current_tracks: DashMap<GuildId, TrackHandle>,
    events: UnboundedSender<PlaybackEvent>,
    connect_timeout: Duration,
    volume: f32,
}

impl SessionController {
    pub fn new(
        songbird: Arc<Songbird>,
        events: UnboundedSender<PlaybackEvent>,
        connect_timeout: Duration,
        volume: f32,
    ) -> Self {
        Self {
            songbird,
            bound: DashMap::new(),
            current_tracks: DashMap::new(),
            events,
            connect_timeout,
            volume,
        }
    }
}

#[async_trait]
impl VoiceSink for SessionController {
    async fn ensure(&self, guild: GuildId, channel: ChannelId) -> Result<(), PlayerError> {
        if let Some(bound) = self.bound.get(&guild).map(|b| *b) {
            if bound == channel && self.songbird.get(guild).is_some() {
                return Ok(());
            }
            if bound != channel {
                info!("🔀 Moviendo sesión de voz en guild {guild}: {bound} → {channel}");
                self.teardown(guild).await;
            }
        }

        let joined = tokio::time::timeout(self.connect_timeout, self.songbird.join(guild, channel))
            .await;

        let call = match joined {
            Err(_) => {
                warn!("sesión de voz no lista a tiempo en guild {guild}");
                self.teardown(guild).await;
                return Err(PlayerError::ConnectTimeout);
            }
            Ok(Err(e)) => {
                self.teardown(guild).await;
                return Err(PlayerError::Session(e.to_string()));
            }
            Ok(Ok(call)) => call,
        };

        // Una sesión caída externamente debe sanear el modelo en memoria
        // sin esperar a que la cola lo descubra.
        {
            let mut call = call.lock().await;
            call.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DisconnectNotifier {
                    guild,
                    events: self.events.clone(),
                },
            );
        }

        self.bound.insert(guild, channel);
        info!("🔊 Sesión de voz lista en guild {guild} (canal {channel})");
        Ok(())
    }

    async fn play(&self, guild: GuildId, input: Input, seq: u64) -> Result<(), PlayerError> {
        let call = self
            .songbird
            .get(guild)
            .ok_or_else(|| PlayerError::Session("sin sesión de voz activa".into()))?;

        let mut call = call.lock().await;
        let handle = call.play_input(input);

        // Atenuación fija de salida; política de renderizado, no del resolver.
        let _ = handle.set_volume(self.volume);

        for (event, errored) in [(TrackEvent::End, false), (TrackEvent::Error, true)] {
            let notifier = TrackNotifier {
                guild,
                seq,
                errored,
                events: self.events.clone(),
            };
            if let Err(e) = handle.add_event(Event::Track(event), notifier) {
                warn!("no se pudo registrar notificador de track: {e}");
            }
        }

        self.current_tracks.insert(guild, handle);
        Ok(())
    }

    async fn stop_current(&self, guild: GuildId) -> bool {
        if let Some((_, handle)) = self.current_tracks.remove(&guild) {
            let _ = handle.stop();
            true
        } else {
            false
        }
    }

    async fn teardown(&self, guild: GuildId) {
        self.stop_current(guild).await;
        self.bound.remove(&guild);

        if self.songbird.get(guild).is_some() {
            if let Err(e) = self.songbird.remove(guild).await {
                debug!("sesión de voz ya desmontada en guild {guild}: {e}");
            } else {
                info!("👋 Sesión de voz desmontada en guild {guild}");
            }
        }
    }

    fn bound_channel(&self, guild: GuildId) -> Option<ChannelId> {
        self.bound.get(&guild).map(|c| *c)
    }
}

/// Notifica fin o error del track en curso, etiquetado con su secuencia.
struct TrackNotifier {
    guild: GuildId,
    seq: u64,
    errored: bool,
    events: UnboundedSender<PlaybackEvent>,
}

#[async_trait]
impl VoiceEventHandler for TrackNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        let event = if self.errored {
            PlaybackEvent::Errored {
                guild: self.guild,
                seq: self.seq,
            }
        } else {
            PlaybackEvent::Finished {
                guild: self.guild,
                seq: self.seq,
            }
        };

        if self.events.send(event).is_err() {
            debug!("buzón de reproducción cerrado; señal descartada");
        }

        None
    }
}

/// Notifica la pérdida de la conexión de voz a nivel de driver.
struct DisconnectNotifier {
    guild: GuildId,
    events: UnboundedSender<PlaybackEvent>,
}

#[async_trait]
impl VoiceEventHandler for DisconnectNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        warn!("🔌 Driver de voz desconectado en guild {}", self.guild);
        let _ = self
            .events
            .send(PlaybackEvent::Disconnected { guild: self.guild });
        None
    }
}
