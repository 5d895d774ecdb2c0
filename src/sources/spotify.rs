use base64::Engine;
use parking_lot::Mutex;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::PlayerError;

/// `{nombre, artista}` de un enlace compartible, usable como término de búsqueda.
#[derive(Debug, Clone)]
pub struct ShareTrack {
    pub name: String,
    pub artist: String,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Cliente mínimo de la Web API de Spotify: solo resuelve enlaces de track
/// a `{nombre, artista}`. Con credenciales ausentes los enlaces de Spotify
/// se tratan como texto de búsqueda normal.
pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: Option<String>,
    client_secret: Option<String>,
    token: Mutex<Option<CachedToken>>,
}

fn track_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"open\.spotify\.com/track/([a-zA-Z0-9]+)").unwrap())
}

fn track_uri_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^spotify:track:([a-zA-Z0-9]+)").unwrap())
}

impl SpotifyClient {
    pub fn new(client_id: Option<String>, client_secret: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id,
            client_secret,
            token: Mutex::new(None),
        }
    }

    /// Detecta enlaces compartibles de track (URL web o URI `spotify:`).
    pub fn is_share_link(query: &str) -> bool {
        track_url_re().is_match(query) || track_uri_re().is_match(query)
    }

    pub fn extract_track_id(query: &str) -> Option<String> {
        track_url_re()
            .captures(query)
            .or_else(|| track_uri_re().captures(query))
            .map(|caps| caps[1].to_string())
    }

    /// Resuelve un enlace compartible. `Ok(None)` significa "no aplicable"
    /// (sin credenciales o sin ID extraíble), no un error.
    pub async fn resolve_share_link(
        &self,
        query: &str,
    ) -> Result<Option<ShareTrack>, PlayerError> {
        let Some(track_id) = Self::extract_track_id(query) else {
            return Ok(None);
        };

        let Some(token) = self.access_token().await? else {
            return Ok(None);
        };

        let response = self
            .http
            .get(format!("https://api.spotify.com/v1/tracks/{track_id}"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| PlayerError::Resolution(format!("consulta a Spotify falló: {e}")))?
            .error_for_status()
            .map_err(|e| PlayerError::Resolution(format!("Spotify respondió error: {e}")))?;

        let track: TrackResponse = response
            .json()
            .await
            .map_err(|e| PlayerError::Resolution(format!("respuesta de Spotify ilegible: {e}")))?;

        let artist = track
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        Ok(Some(ShareTrack {
            name: track.name,
            artist,
        }))
    }

    /// Token de client-credentials, cacheado hasta 30 s antes de expirar.
    async fn access_token(&self) -> Result<Option<String>, PlayerError> {
        let (Some(id), Some(secret)) = (&self.client_id, &self.client_secret) else {
            warn!("credenciales de Spotify ausentes; se omite la resolución de enlaces");
            return Ok(None);
        };

        if let Some(cached) = self.token.lock().as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(Some(cached.access_token.clone()));
            }
        }

        let credentials =
            base64::engine::general_purpose::STANDARD.encode(format!("{id}:{secret}"));

        let response = self
            .http
            .post("https://accounts.spotify.com/api/token")
            .header("Authorization", format!("Basic {credentials}"))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| PlayerError::Resolution(format!("token de Spotify falló: {e}")))?
            .error_for_status()
            .map_err(|e| PlayerError::Resolution(format!("token de Spotify rechazado: {e}")))?;

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| PlayerError::Resolution(format!("token de Spotify ilegible: {e}")))?;

        debug!("token de Spotify renovado, expira en {}s", token.expires_in);

        let access_token = token.access_token.clone();
        *self.token.lock() = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in.saturating_sub(30)),
        });

        Ok(Some(access_token))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct TrackResponse {
    name: String,
    #[serde(default)]
    artists: Vec<ArtistRef>,
}

#[derive(Debug, Deserialize)]
struct ArtistRef {
    name: String,
}
