pub mod queue;
pub mod session;
pub mod stream;

use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::PlayerError;
use crate::sources::{Track, TrackResolver};

use self::queue::{QueueSnapshot, RoomQueue};
use self::session::VoiceSink;
use self::stream::StreamOpener;

/// Señal del lado del driver hacia el gestor de colas. Todas las señales
/// de track llevan la secuencia del play que las originó; el gestor
/// descarta las que ya no correspondan al play en curso.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    Finished { guild: GuildId, seq: u64 },
    Errored { guild: GuildId, seq: u64 },
    Disconnected { guild: GuildId },
}

/// Resultado de un enqueue aceptado.
#[derive(Debug, Clone)]
pub struct Enqueued {
    pub track: Track,
    /// 0 = empezó a sonar de inmediato; n > 0 = posición en pendientes.
    pub position: usize,
}

/// Gestor de reproducción por guild. Mantiene una cola FIFO por guild,
/// avanza automáticamente al terminar cada track y consume las señales
/// del driver desde un único buzón.
pub struct Playback {
    rooms: DashMap<GuildId, Arc<Mutex<RoomQueue>>>,
    resolver: Arc<dyn TrackResolver>,
    opener: Arc<dyn StreamOpener>,
    sink: Arc<dyn VoiceSink>,
}

impl Playback {
    pub fn new(
        resolver: Arc<dyn TrackResolver>,
        opener: Arc<dyn StreamOpener>,
        sink: Arc<dyn VoiceSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            rooms: DashMap::new(),
            resolver,
            opener,
            sink,
        })
    }

    /// Lanza la tarea que drena el buzón de señales. Debe existir
    /// exactamente un consumidor por proceso.
    pub fn spawn_event_loop(self: &Arc<Self>, mut events: UnboundedReceiver<PlaybackEvent>) {
        let playback = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                playback.handle_event(event).await;
            }
            debug!("buzón de reproducción cerrado; tarea de señales finalizada");
        });
    }

    /// Resuelve la consulta y la encola en la guild, arrancando la
    /// reproducción si la guild estaba ociosa. Cualquier fallo de sesión
    /// o el agotamiento de la cola desmonta el estado de la guild.
    pub async fn enqueue(
        &self,
        guild: GuildId,
        channel: ChannelId,
        query: &str,
        requested_by: &str,
    ) -> Result<Enqueued, PlayerError> {
        // Mudanza de canal: el track en curso se reinicia desde el
        // principio en la sesión nueva, y sus señales quedan invalidadas
        // antes de que el stop del teardown las dispare.
        if let Some(bound) = self.sink.bound_channel(guild) {
            if bound != channel {
                if let Some(room) = self.room(guild) {
                    let mut state = room.lock().await;
                    if let Some(current) = state.take_current() {
                        info!("↩️ Mudanza de canal: '{}' se reiniciará", current.title);
                        state.requeue_front(current);
                    }
                }
            }
        }

        if let Err(e) = self.sink.ensure(guild, channel).await {
            self.teardown(guild).await;
            return Err(e);
        }

        let track = match self.resolver.resolve(query, requested_by).await {
            Ok(track) => track,
            Err(e) => {
                // Sin cola previa el usuario no tiene /stop que alcance la
                // sesión recién establecida; no debe quedar huérfana.
                if self.room(guild).is_none() {
                    self.teardown(guild).await;
                }
                return Err(e);
            }
        };

        let room = self
            .rooms
            .entry(guild)
            .or_insert_with(|| Arc::new(Mutex::new(RoomQueue::new())))
            .clone();

        let mut state = room.lock().await;
        let was_idle = state.is_idle();
        state.push_pending(track.clone());

        let position = if was_idle {
            state.pending_len() - 1
        } else {
            state.pending_len()
        };

        if was_idle {
            if let Err(e) = self.advance(guild, &mut state).await {
                drop(state);
                self.teardown(guild).await;
                return Err(e);
            }
        }

        info!(
            "📥 Encolado en guild {guild}: '{}' (posición {position})",
            track.title
        );
        Ok(Enqueued { track, position })
    }

    /// Detiene el track en curso y lo devuelve. El avance al siguiente lo
    /// dispara la señal de fin que produce el stop.
    pub async fn skip(&self, guild: GuildId) -> Result<Track, PlayerError> {
        let room = self.room(guild).ok_or(PlayerError::NotPlaying)?;

        let skipped = {
            let state = room.lock().await;
            state.current().cloned().ok_or(PlayerError::NotPlaying)?
        };

        self.sink.stop_current(guild).await;
        info!("⏭️ Saltado en guild {guild}: '{}'", skipped.title);
        Ok(skipped)
    }

    /// Vacía la cola, detiene la reproducción y desmonta la sesión.
    pub async fn stop(&self, guild: GuildId) -> Result<(), PlayerError> {
        let room = self.room(guild).ok_or(PlayerError::NotQueued)?;

        {
            let mut state = room.lock().await;
            state.clear_pending();
            state.take_current();
        }

        self.sink.stop_current(guild).await;
        self.teardown(guild).await;
        info!("⏹️ Reproducción detenida en guild {guild}");
        Ok(())
    }

    /// Vista actual de la cola de la guild; con la guild sin cola devuelve
    /// la forma vacía, nunca un error.
    pub async fn snapshot(&self, guild: GuildId) -> QueueSnapshot {
        let Some(room) = self.room(guild) else {
            return QueueSnapshot::default();
        };

        let state = room.lock().await;
        QueueSnapshot {
            current: state.current().cloned(),
            pending: state.pending_tracks(),
            bound_channel: self.sink.bound_channel(guild),
        }
    }

    /// Descarta todo el estado de la guild. Idempotente.
    pub async fn teardown(&self, guild: GuildId) {
        if self.rooms.remove(&guild).is_some() {
            debug!("cola de guild {guild} descartada");
        }
        self.sink.teardown(guild).await;
    }

    async fn handle_event(&self, event: PlaybackEvent) {
        let (guild, seq) = match event {
            PlaybackEvent::Disconnected { guild } => {
                info!("🧹 Desconexión externa en guild {guild}; limpiando estado");
                self.teardown(guild).await;
                return;
            }
            PlaybackEvent::Errored { guild, seq } => {
                warn!("⚠️ El driver reportó error de track en guild {guild}");
                (guild, seq)
            }
            PlaybackEvent::Finished { guild, seq } => (guild, seq),
        };

        let Some(room) = self.room(guild) else {
            debug!("señal para guild {guild} sin cola; ignorada");
            return;
        };

        let mut state = room.lock().await;
        if !state.matches_current(seq) {
            debug!("señal obsoleta (seq {seq}) en guild {guild}; ignorada");
            return;
        }

        state.clear_current();

        if !state.has_pending() {
            drop(state);
            self.teardown(guild).await;
            return;
        }

        if let Err(e) = self.advance(guild, &mut state).await {
            warn!("cola de guild {guild} agotada tras fallos: {e}");
            drop(state);
            self.teardown(guild).await;
        }
    }

    /// Avanza al siguiente pendiente reproducible. Los tracks cuyo stream
    /// no abre o no acopla se descartan y se sigue con el siguiente; con
    /// los pendientes agotados devuelve el último fallo.
    async fn advance(&self, guild: GuildId, state: &mut RoomQueue) -> Result<(), PlayerError> {
        let mut last_err = None;

        while let Some(next) = state.pop_pending() {
            let seq = state.bump_seq();

            let input = match self.opener.open(&next.url).await {
                Ok(input) => input,
                Err(e) => {
                    warn!("stream no disponible para '{}': {e}", next.title);
                    last_err = Some(e);
                    continue;
                }
            };

            match self.sink.play(guild, input, seq).await {
                Ok(()) => {
                    info!("🎵 Reproduciendo en guild {guild}: '{}'", next.title);
                    state.set_current(next, seq);
                    return Ok(());
                }
                Err(e) => {
                    warn!("no se pudo acoplar '{}': {e}", next.title);
                    last_err = Some(e);
                }
            }
        }

        state.clear_current();
        Err(last_err.unwrap_or(PlayerError::NotQueued))
    }

    fn room(&self, guild: GuildId) -> Option<Arc<Mutex<RoomQueue>>> {
        self.rooms.get(&guild).map(|r| Arc::clone(r.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use songbird::input::{AudioStream, Input, LiveInput};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use super::stream::MockStreamOpener;
    use symphonia::core::io::{MediaSource, ReadOnlySource};

    use crate::sources::MockTrackResolver;

    fn guild() -> GuildId {
        GuildId::new(99)
    }

    fn channel() -> ChannelId {
        ChannelId::new(7)
    }

    fn silent_input() -> Input {
        let cursor = std::io::Cursor::new(Vec::<u8>::new());
        Input::Live(
            LiveInput::Raw(AudioStream {
                input: Box::new(ReadOnlySource::new(cursor)) as Box<dyn MediaSource>,
                hint: None,
            }),
            None,
        )
    }

    /// Resolver que fabrica un track determinista a partir de la consulta.
    fn echo_resolver() -> MockTrackResolver {
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve().returning(|query, requester| {
            Ok(Track {
                title: query.to_string(),
                url: format!("https://www.youtube.com/watch?v={}", query.replace(' ', "-")),
                duration: "3:03".to_string(),
                requested_by: requester.to_string(),
            })
        });
        resolver
    }

    /// Resolver que rechaza toda consulta que contenga "falla".
    fn resolver_rejecting_falla() -> MockTrackResolver {
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve().returning(|query, requester| {
            if query.contains("falla") {
                Err(PlayerError::Resolution(query.to_string()))
            } else {
                Ok(Track {
                    title: query.to_string(),
                    url: format!("https://www.youtube.com/watch?v={}", query.replace(' ', "-")),
                    duration: "3:03".to_string(),
                    requested_by: requester.to_string(),
                })
            }
        });
        resolver
    }

    fn opener_ok() -> MockStreamOpener {
        let mut opener = MockStreamOpener::new();
        opener.expect_open().returning(|_| Ok(silent_input()));
        opener
    }

    /// Opener que rechaza toda URL que contenga "mala".
    fn opener_rejecting_mala() -> MockStreamOpener {
        let mut opener = MockStreamOpener::new();
        opener.expect_open().returning(|url| {
            if url.contains("mala") {
                Err(PlayerError::Stream("stream roto".into()))
            } else {
                Ok(silent_input())
            }
        });
        opener
    }

    #[derive(Default)]
    struct FakeSink {
        plays: parking_lot::Mutex<Vec<(GuildId, u64)>>,
        stops: AtomicUsize,
        teardowns: AtomicUsize,
    }

    #[async_trait]
    impl VoiceSink for FakeSink {
        async fn ensure(&self, _guild: GuildId, _channel: ChannelId) -> Result<(), PlayerError> {
            Ok(())
        }

        async fn play(&self, guild: GuildId, _input: Input, seq: u64) -> Result<(), PlayerError> {
            self.plays.lock().push((guild, seq));
            Ok(())
        }

        async fn stop_current(&self, _guild: GuildId) -> bool {
            self.stops.fetch_add(1, Ordering::SeqCst);
            true
        }

        async fn teardown(&self, _guild: GuildId) {
            self.teardowns.fetch_add(1, Ordering::SeqCst);
        }

        fn bound_channel(&self, _guild: GuildId) -> Option<ChannelId> {
            None
        }
    }

    fn playback_with(
        resolver: MockTrackResolver,
        opener: MockStreamOpener,
    ) -> (Arc<Playback>, Arc<FakeSink>) {
        let sink = Arc::new(FakeSink::default());
        let playback = Playback::new(Arc::new(resolver), Arc::new(opener), sink.clone());
        (playback, sink)
    }

    #[tokio::test]
    async fn test_first_enqueue_plays_immediately_then_queues_fifo() {
        let (playback, sink) = playback_with(echo_resolver(), opener_ok());

        let first = playback
            .enqueue(guild(), channel(), "una cancion", "ana#1")
            .await
            .unwrap();
        assert_eq!(first.position, 0);

        let second = playback
            .enqueue(guild(), channel(), "otra cancion", "ana#1")
            .await
            .unwrap();
        assert_eq!(second.position, 1);

        let third = playback
            .enqueue(guild(), channel(), "tercera", "beto#2")
            .await
            .unwrap();
        assert_eq!(third.position, 2);

        let snapshot = playback.snapshot(guild()).await;
        assert_eq!(snapshot.current.unwrap().title, "una cancion");
        assert_eq!(
            snapshot
                .pending
                .iter()
                .map(|t| t.title.as_str())
                .collect::<Vec<_>>(),
            vec!["otra cancion", "tercera"]
        );
        assert_eq!(sink.plays.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_finished_signal_advances_to_next_pending() {
        let (playback, sink) = playback_with(echo_resolver(), opener_ok());

        playback.enqueue(guild(), channel(), "t", "u#1").await.unwrap();
        playback.enqueue(guild(), channel(), "a", "u#1").await.unwrap();
        playback.enqueue(guild(), channel(), "b", "u#1").await.unwrap();

        let seq = sink.plays.lock()[0].1;
        playback
            .handle_event(PlaybackEvent::Finished { guild: guild(), seq })
            .await;

        let snapshot = playback.snapshot(guild()).await;
        assert_eq!(snapshot.current.unwrap().title, "a");
        assert_eq!(snapshot.pending.len(), 1);
        assert_eq!(snapshot.pending[0].title, "b");
        assert_eq!(sink.plays.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_skip_returns_current_and_leaves_advance_to_signal() {
        let (playback, sink) = playback_with(echo_resolver(), opener_ok());

        playback.enqueue(guild(), channel(), "t", "u#1").await.unwrap();
        playback.enqueue(guild(), channel(), "a", "u#1").await.unwrap();

        let skipped = playback.skip(guild()).await.unwrap();
        assert_eq!(skipped.title, "t");
        assert_eq!(sink.stops.load(Ordering::SeqCst), 1);

        // El avance no ocurre hasta que llega la señal de fin del stop.
        let snapshot = playback.snapshot(guild()).await;
        assert_eq!(snapshot.current.unwrap().title, "t");

        let seq = sink.plays.lock()[0].1;
        playback
            .handle_event(PlaybackEvent::Finished { guild: guild(), seq })
            .await;

        let snapshot = playback.snapshot(guild()).await;
        assert_eq!(snapshot.current.unwrap().title, "a");
        assert!(snapshot.pending.is_empty());
    }

    #[tokio::test]
    async fn test_skip_without_current_is_not_playing() {
        let (playback, _sink) = playback_with(echo_resolver(), opener_ok());
        let err = playback.skip(guild()).await.unwrap_err();
        assert!(matches!(err, PlayerError::NotPlaying));
    }

    #[tokio::test]
    async fn test_stop_clears_room_and_is_not_repeatable() {
        let (playback, sink) = playback_with(echo_resolver(), opener_ok());

        playback.enqueue(guild(), channel(), "t", "u#1").await.unwrap();
        playback.enqueue(guild(), channel(), "a", "u#1").await.unwrap();

        playback.stop(guild()).await.unwrap();

        let snapshot = playback.snapshot(guild()).await;
        assert!(snapshot.is_empty());
        assert!(sink.teardowns.load(Ordering::SeqCst) >= 1);

        let err = playback.stop(guild()).await.unwrap_err();
        assert!(matches!(err, PlayerError::NotQueued));
    }

    #[tokio::test]
    async fn test_signal_after_stop_is_stale() {
        let (playback, sink) = playback_with(echo_resolver(), opener_ok());

        playback.enqueue(guild(), channel(), "t", "u#1").await.unwrap();
        let seq = sink.plays.lock()[0].1;

        playback.stop(guild()).await.unwrap();

        // El stop dispara una señal de fin tardía; no debe resucitar nada.
        playback
            .handle_event(PlaybackEvent::Finished { guild: guild(), seq })
            .await;
        assert!(playback.snapshot(guild()).await.is_empty());
        assert_eq!(sink.plays.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_advance_discards_unplayable_and_continues() {
        let (playback, sink) = playback_with(echo_resolver(), opener_rejecting_mala());

        playback.enqueue(guild(), channel(), "buena", "u#1").await.unwrap();
        playback.enqueue(guild(), channel(), "mala", "u#1").await.unwrap();
        playback.enqueue(guild(), channel(), "otra buena", "u#1").await.unwrap();

        let seq = sink.plays.lock()[0].1;
        playback
            .handle_event(PlaybackEvent::Finished { guild: guild(), seq })
            .await;

        let snapshot = playback.snapshot(guild()).await;
        assert_eq!(snapshot.current.unwrap().title, "otra buena");
        assert!(snapshot.pending.is_empty());
        assert_eq!(sink.plays.lock().len(), 2);
        assert_eq!(sink.teardowns.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sole_unplayable_track_fails_and_tears_down() {
        let (playback, sink) = playback_with(echo_resolver(), opener_rejecting_mala());

        let err = playback
            .enqueue(guild(), channel(), "mala", "u#1")
            .await
            .unwrap_err();
        assert!(matches!(err, PlayerError::Stream(_)));

        assert!(playback.snapshot(guild()).await.is_empty());
        assert!(sink.teardowns.load(Ordering::SeqCst) >= 1);
        assert!(sink.plays.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_resolution_on_idle_guild_releases_session() {
        let (playback, sink) = playback_with(resolver_rejecting_falla(), opener_ok());

        let err = playback
            .enqueue(guild(), channel(), "falla total", "u#1")
            .await
            .unwrap_err();
        assert!(matches!(err, PlayerError::Resolution(_)));

        // La sesión establecida por ensure no debe quedar colgada sin una
        // cola desde la que alcanzarla con /stop.
        assert!(sink.teardowns.load(Ordering::SeqCst) >= 1);
        assert!(playback.snapshot(guild()).await.is_empty());
        assert!(sink.plays.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_resolution_keeps_ongoing_playback() {
        let (playback, sink) = playback_with(resolver_rejecting_falla(), opener_ok());

        playback.enqueue(guild(), channel(), "buena", "u#1").await.unwrap();

        let err = playback
            .enqueue(guild(), channel(), "falla", "u#1")
            .await
            .unwrap_err();
        assert!(matches!(err, PlayerError::Resolution(_)));

        assert_eq!(sink.teardowns.load(Ordering::SeqCst), 0);
        let snapshot = playback.snapshot(guild()).await;
        assert_eq!(snapshot.current.unwrap().title, "buena");

        // Y el /stop posterior sigue alcanzando la sesión.
        playback.stop(guild()).await.unwrap();
        assert!(sink.teardowns.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_finished_with_empty_pending_tears_down() {
        let (playback, sink) = playback_with(echo_resolver(), opener_ok());

        playback.enqueue(guild(), channel(), "unica", "u#1").await.unwrap();
        let seq = sink.plays.lock()[0].1;

        playback
            .handle_event(PlaybackEvent::Finished { guild: guild(), seq })
            .await;

        assert!(playback.snapshot(guild()).await.is_empty());
        assert!(sink.teardowns.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_errored_signal_advances_like_finished() {
        let (playback, sink) = playback_with(echo_resolver(), opener_ok());

        playback.enqueue(guild(), channel(), "t", "u#1").await.unwrap();
        playback.enqueue(guild(), channel(), "a", "u#1").await.unwrap();

        let seq = sink.plays.lock()[0].1;
        playback
            .handle_event(PlaybackEvent::Errored { guild: guild(), seq })
            .await;

        let snapshot = playback.snapshot(guild()).await;
        assert_eq!(snapshot.current.unwrap().title, "a");
    }

    #[tokio::test]
    async fn test_stale_signal_is_ignored() {
        let (playback, sink) = playback_with(echo_resolver(), opener_ok());

        playback.enqueue(guild(), channel(), "t", "u#1").await.unwrap();

        playback
            .handle_event(PlaybackEvent::Finished {
                guild: guild(),
                seq: 424_242,
            })
            .await;

        let snapshot = playback.snapshot(guild()).await;
        assert_eq!(snapshot.current.unwrap().title, "t");
        assert_eq!(sink.teardowns.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disconnect_signal_discards_room() {
        let (playback, sink) = playback_with(echo_resolver(), opener_ok());

        playback.enqueue(guild(), channel(), "t", "u#1").await.unwrap();
        playback.enqueue(guild(), channel(), "a", "u#1").await.unwrap();

        playback
            .handle_event(PlaybackEvent::Disconnected { guild: guild() })
            .await;

        assert!(playback.snapshot(guild()).await.is_empty());
        assert!(sink.teardowns.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_concurrent_enqueues_start_exactly_one_play() {
        let (playback, sink) = playback_with(echo_resolver(), opener_ok());

        let (first, second) = tokio::join!(
            playback.enqueue(guild(), channel(), "uno", "u#1"),
            playback.enqueue(guild(), channel(), "dos", "u#2"),
        );

        let mut positions = vec![first.unwrap().position, second.unwrap().position];
        positions.sort_unstable();
        assert_eq!(positions, vec![0, 1]);
        assert_eq!(sink.plays.lock().len(), 1);

        let snapshot = playback.snapshot(guild()).await;
        assert!(snapshot.current.is_some());
        assert_eq!(snapshot.pending.len(), 1);
    }

    #[tokio::test]
    async fn test_queues_are_independent_per_guild() {
        let (playback, sink) = playback_with(echo_resolver(), opener_ok());
        let other = GuildId::new(100);

        playback.enqueue(guild(), channel(), "t", "u#1").await.unwrap();
        playback.enqueue(other, channel(), "x", "u#2").await.unwrap();

        playback.stop(guild()).await.unwrap();

        assert!(playback.snapshot(guild()).await.is_empty());
        assert_eq!(playback.snapshot(other).await.current.unwrap().title, "x");
        assert_eq!(sink.plays.lock().len(), 2);
    }
}
