use tracing::{debug, warn};
use url::Url;

use crate::error::PlayerError;

/// Argumentos comunes a toda invocación de yt-dlp.
pub const YTDLP_BASE_ARGS: &[&str] = &[
    "--no-check-certificates",
    "--no-warnings",
    "--prefer-free-formats",
];

/// Metadatos de un video obtenidos por sondeo directo.
#[derive(Debug, Clone)]
pub struct ProbedTrack {
    pub title: String,
    pub canonical_url: String,
    pub duration_secs: Option<u64>,
}

/// Resultado crudo de una búsqueda `ytsearch`.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
}

/// Cliente de metadatos sobre yt-dlp. No descarga audio: eso es trabajo
/// del stream opener.
pub struct YtDlpClient {
    cookie: Option<String>,
}

impl YtDlpClient {
    pub fn new(cookie: Option<String>) -> Self {
        Self { cookie }
    }

    fn base_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("yt-dlp");
        cmd.args(YTDLP_BASE_ARGS);
        if let Some(cookie) = &self.cookie {
            cmd.args(["--add-header", &format!("Cookie: {cookie}")]);
        }
        cmd
    }

    /// Sondea los metadatos de una URL concreta.
    ///
    /// El orden `url|duration|title` permite partir con `splitn`: el título
    /// puede contener `|`, los otros dos campos no.
    pub async fn probe(&self, url: &str) -> Result<ProbedTrack, PlayerError> {
        let mut cmd = self.base_command();
        cmd.args([
            "--print",
            "%(webpage_url)s|%(duration)s|%(title)s",
            "--skip-download",
            "--no-playlist",
            "--socket-timeout",
            "30",
            "--retries",
            "3",
        ]);
        cmd.arg(url);

        let output = cmd
            .output()
            .await
            .map_err(|e| PlayerError::Stream(format!("no se pudo ejecutar yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PlayerError::Stream(format!(
                "yt-dlp terminó con {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .next()
            .ok_or_else(|| PlayerError::Stream("yt-dlp no devolvió metadatos".into()))?;

        parse_probe_line(line, url)
            .ok_or_else(|| PlayerError::Stream(format!("respuesta de yt-dlp ilegible: {line}")))
    }

    /// Búsqueda ranqueada en YouTube; devuelve como máximo `limit` candidatos.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, PlayerError> {
        let mut cmd = self.base_command();
        cmd.args([
            "--print",
            "%(url)s|%(title)s",
            "--flat-playlist",
            "--skip-download",
            "--socket-timeout",
            "15",
            "--retries",
            "2",
        ]);
        cmd.arg(format!("ytsearch{}:{}", limit, query));

        let output = cmd
            .output()
            .await
            .map_err(|e| PlayerError::Resolution(format!("búsqueda no disponible: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("búsqueda yt-dlp falló: {}", stderr.trim());
            return Err(PlayerError::Resolution(format!(
                "la búsqueda de YouTube falló para: {query}"
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let hits: Vec<SearchHit> = stdout
            .lines()
            .take(limit)
            .filter_map(|line| {
                let (url, title) = line.split_once('|')?;
                if url.is_empty() || url == "NA" {
                    debug!("candidato de búsqueda sin URL: {line}");
                    return None;
                }
                Some(SearchHit {
                    url: url.to_string(),
                    title: title.to_string(),
                })
            })
            .collect();

        Ok(hits)
    }
}

fn parse_probe_line(line: &str, fallback_url: &str) -> Option<ProbedTrack> {
    let mut parts = line.splitn(3, '|');
    let url = parts.next()?;
    let duration = parts.next()?;
    let title = parts.next()?;

    let canonical_url = if url.is_empty() || url == "NA" {
        fallback_url.to_string()
    } else {
        url.to_string()
    };

    Some(ProbedTrack {
        title: title.to_string(),
        canonical_url,
        // yt-dlp imprime "NA" o un float para streams en vivo
        duration_secs: duration.parse::<f64>().ok().map(|d| d as u64),
    })
}

/// Canonicaliza una URL de YouTube a su forma `watch?v=`.
///
/// Enlaces cortos (`youtu.be/ID`) y "shorts" (`/shorts/ID`) se reescriben a
/// la forma canónica; el resto de URLs válidas pasan sin tocar (quitando el
/// ruido de playlist/query). Devuelve `None` si la URL no se puede parsear.
pub fn normalize_youtube_url(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw).ok()?;
    let host = parsed.host_str()?;

    if host.contains("youtu.be") {
        let video_id = parsed.path().trim_start_matches('/');
        if video_id.is_empty() {
            return None;
        }
        return Some(watch_url(video_id));
    }

    if host.contains("youtube.com") {
        if let Some((_, video_id)) = parsed.query_pairs().find(|(k, _)| k == "v") {
            return Some(watch_url(&video_id));
        }

        let segments: Vec<&str> = parsed.path().split('/').filter(|s| !s.is_empty()).collect();
        if let ["shorts", video_id, ..] = segments.as_slice() {
            return Some(watch_url(video_id));
        }
    }

    Some(parsed.to_string())
}

fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

pub fn is_youtube_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => url
            .host_str()
            .map(|h| h.contains("youtube.com") || h.contains("youtu.be"))
            .unwrap_or(false),
        Err(_) => false,
    }
}

/// Renderiza segundos totales como `m:ss`; sin duración conocida, "Unknown".
pub fn format_duration(total_seconds: Option<u64>) -> String {
    match total_seconds {
        Some(secs) => format!("{}:{:02}", secs / 60, secs % 60),
        None => "Unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_short_link_and_shorts_agree() {
        let canonical = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
        assert_eq!(
            normalize_youtube_url("https://youtu.be/dQw4w9WgXcQ").as_deref(),
            Some(canonical)
        );
        assert_eq!(
            normalize_youtube_url("https://www.youtube.com/shorts/dQw4w9WgXcQ").as_deref(),
            Some(canonical)
        );
        assert_eq!(
            normalize_youtube_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=PLx&index=4")
                .as_deref(),
            Some(canonical)
        );
    }

    #[test]
    fn test_normalize_passes_through_other_urls() {
        assert_eq!(
            normalize_youtube_url("https://example.com/audio.mp3").as_deref(),
            Some("https://example.com/audio.mp3")
        );
        assert_eq!(normalize_youtube_url("no es una url"), None);
        assert_eq!(normalize_youtube_url("https://youtu.be/"), None);
    }

    #[test]
    fn test_youtube_url_detection() {
        assert!(is_youtube_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_youtube_url("https://youtu.be/dQw4w9WgXcQ"));
        assert!(is_youtube_url("https://music.youtube.com/watch?v=test"));
        assert!(!is_youtube_url("https://example.com/video"));
        assert!(!is_youtube_url("hola"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Some(0)), "0:00");
        assert_eq!(format_duration(Some(65)), "1:05");
        assert_eq!(format_duration(Some(3599)), "59:59");
        assert_eq!(format_duration(None), "Unknown");
    }

    #[test]
    fn test_parse_probe_line_with_pipe_in_title() {
        let parsed = parse_probe_line(
            "https://www.youtube.com/watch?v=abc|212.0|Artista | Tema (Oficial)",
            "https://fallback",
        )
        .unwrap();
        assert_eq!(parsed.canonical_url, "https://www.youtube.com/watch?v=abc");
        assert_eq!(parsed.duration_secs, Some(212));
        assert_eq!(parsed.title, "Artista | Tema (Oficial)");
    }

    #[test]
    fn test_parse_probe_line_without_duration() {
        let parsed = parse_probe_line("NA|NA|Directo 24/7", "https://fallback").unwrap();
        assert_eq!(parsed.canonical_url, "https://fallback");
        assert_eq!(parsed.duration_secs, None);
    }
}
