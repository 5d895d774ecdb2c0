pub mod spotify;
pub mod youtube;

use async_trait::async_trait;
use tracing::{debug, info, warn};

pub use self::spotify::SpotifyClient;
pub use self::youtube::YtDlpClient;

use crate::{config::Config, error::PlayerError};
use self::youtube::{format_duration, is_youtube_url, normalize_youtube_url};

/// Descriptor inmutable de una pista, creado una sola vez al resolverla.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub title: String,
    /// URL canónica reproducible (forma `watch?v=` para YouTube).
    pub url: String,
    /// Duración renderizada `m:ss`, o el literal "Unknown".
    pub duration: String,
    pub requested_by: String,
}

/// Resuelve la consulta de un usuario a un [`Track`] canónico.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str, requested_by: &str) -> Result<Track, PlayerError>;
}

/// Cadena ordenada de estrategias de resolución: enlace de Spotify →
/// URL directa de YouTube → búsqueda ranqueada. Cada paso devuelve
/// `Some(Track)` o cede al siguiente; agotar la cadena es `Resolution`.
pub struct SourceResolver {
    ytdlp: YtDlpClient,
    spotify: SpotifyClient,
    search_limit: usize,
}

impl SourceResolver {
    pub fn new(config: &Config) -> Self {
        Self {
            ytdlp: YtDlpClient::new(config.youtube_cookie.clone()),
            spotify: SpotifyClient::new(
                config.spotify_client_id.clone(),
                config.spotify_client_secret.clone(),
            ),
            search_limit: config.search_limit,
        }
    }

    /// Paso 1: un enlace compartible de Spotify se reescribe a
    /// `"<nombre> <artista>"`. Si la resolución falla, la consulta
    /// original sigue su curso.
    async fn rewrite_share_link(&self, query: &str) -> String {
        if !SpotifyClient::is_share_link(query) {
            return query.to_string();
        }

        match self.spotify.resolve_share_link(query).await {
            Ok(Some(share)) => {
                let rewritten = format!("{} {}", share.name, share.artist);
                info!("🔁 Enlace de Spotify reescrito a: {}", rewritten.trim());
                rewritten.trim().to_string()
            }
            Ok(None) => query.to_string(),
            Err(e) => {
                warn!("resolución de enlace de Spotify falló: {e}");
                query.to_string()
            }
        }
    }

    /// Paso 2: URL directa de YouTube, normalizada y sondeada.
    async fn try_direct_lookup(&self, query: &str, requested_by: &str) -> Option<Track> {
        if !is_youtube_url(query) {
            return None;
        }

        let canonical = normalize_youtube_url(query)?;
        match self.ytdlp.probe(&canonical).await {
            Ok(probed) => Some(self.build_track(probed, requested_by)),
            Err(e) => {
                warn!("lookup directo falló, cayendo a búsqueda: {e}");
                None
            }
        }
    }

    /// Paso 3: búsqueda ranqueada; se sondea cada candidato en orden hasta
    /// que uno resulte reproducible.
    async fn try_search(
        &self,
        query: &str,
        requested_by: &str,
    ) -> Result<Option<Track>, PlayerError> {
        let hits = self.ytdlp.search(query, self.search_limit).await?;

        for hit in hits {
            let Some(canonical) = normalize_youtube_url(&hit.url) else {
                debug!("candidato no normalizable: {}", hit.url);
                continue;
            };

            match self.ytdlp.probe(&canonical).await {
                Ok(probed) => return Ok(Some(self.build_track(probed, requested_by))),
                Err(e) => {
                    warn!("candidato '{}' no reproducible: {e}", hit.title);
                }
            }
        }

        Ok(None)
    }

    fn build_track(&self, probed: youtube::ProbedTrack, requested_by: &str) -> Track {
        Track {
            title: probed.title,
            url: probed.canonical_url,
            duration: format_duration(probed.duration_secs),
            requested_by: requested_by.to_string(),
        }
    }
}

#[async_trait]
impl TrackResolver for SourceResolver {
    async fn resolve(&self, query: &str, requested_by: &str) -> Result<Track, PlayerError> {
        let query = self.rewrite_share_link(query).await;

        if let Some(track) = self.try_direct_lookup(&query, requested_by).await {
            return Ok(track);
        }

        if let Some(track) = self.try_search(&query, requested_by).await? {
            return Ok(track);
        }

        Err(PlayerError::Resolution(query))
    }
}
