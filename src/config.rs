use anyhow::Result;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Reproducción
    /// Atenuación fija aplicada al entregar el stream al driver de voz.
    pub playback_volume: f32,
    /// Límite duro de espera para que la sesión de voz esté lista.
    pub connect_timeout: Duration,
    /// Máximo de candidatos de búsqueda a sondear por consulta.
    pub search_limit: usize,

    // APIs (opcionales)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,

    /// Cookie reenviada a yt-dlp como cabecera HTTP (evita throttling).
    pub youtube_cookie: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Reproducción
            playback_volume: std::env::var("PLAYBACK_VOLUME")
                .unwrap_or_else(|_| "0.02".to_string())
                .parse()?,
            connect_timeout: Duration::from_secs(
                std::env::var("CONNECT_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()?,
            ),
            search_limit: std::env::var("SEARCH_LIMIT")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,

            // APIs
            spotify_client_id: std::env::var("SPOTIFY_CLIENT_ID").ok(),
            spotify_client_secret: std::env::var("SPOTIFY_CLIENT_SECRET").ok(),

            youtube_cookie: std::env::var("YOUTUBE_COOKIE").ok(),
        };

        config.validate()?;

        Ok(config)
    }

    /// Chequeos de sanidad sobre los valores cargados.
    pub fn validate(&self) -> Result<()> {
        if self.playback_volume < 0.0 || self.playback_volume > 1.0 {
            anyhow::bail!(
                "PLAYBACK_VOLUME debe estar entre 0.0 y 1.0, se recibió: {}",
                self.playback_volume
            );
        }

        if self.connect_timeout.is_zero() {
            anyhow::bail!("CONNECT_TIMEOUT_SECS debe ser mayor que 0");
        }

        if self.search_limit == 0 || self.search_limit > 10 {
            anyhow::bail!(
                "SEARCH_LIMIT debe estar entre 1 y 10, se recibió: {}",
                self.search_limit
            );
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,
            playback_volume: 0.02,
            connect_timeout: Duration::from_secs(20),
            search_limit: 5,
            spotify_client_id: None,
            spotify_client_secret: None,
            youtube_cookie: None,
        }
    }
}
