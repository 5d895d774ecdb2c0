use async_trait::async_trait;
use parking_lot::Mutex;
use songbird::input::{
    codecs::{get_codec_registry, get_probe},
    AudioStream, Input, LiveInput,
};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;
use symphonia::core::io::MediaSource;
use tracing::{debug, info, warn};

use crate::error::PlayerError;
use crate::sources::youtube::{normalize_youtube_url, YTDLP_BASE_ARGS};

/// Argumentos para emitir el mejor audio disponible por stdout.
const YTDLP_STREAM_ARGS: &[&str] = &[
    "-o",
    "-",
    "-q",
    "-f",
    "bestaudio[ext=m4a]/bestaudio",
    "--no-playlist",
    "--default-search",
    "auto",
];

/// Abre una URL canónica como stream de audio decodificable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamOpener: Send + Sync {
    async fn open(&self, url: &str) -> Result<Input, PlayerError>;
}

/// Opener respaldado por un subproceso yt-dlp por stream. El subproceso y
/// el stream devuelto viven y mueren juntos: soltar el `Input` termina el
/// proceso si sigue vivo.
pub struct YtDlpStreamOpener {
    cookie: Option<String>,
}

impl YtDlpStreamOpener {
    pub fn new(cookie: Option<String>) -> Self {
        Self { cookie }
    }

    fn spawn_downloader(&self, url: &str) -> Result<Child, PlayerError> {
        let mut cmd = Command::new("yt-dlp");
        cmd.args(YTDLP_BASE_ARGS);
        cmd.args(YTDLP_STREAM_ARGS);
        if let Some(cookie) = &self.cookie {
            cmd.args(["--add-header", &format!("Cookie: {cookie}")]);
        }
        cmd.arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        cmd.spawn()
            .map_err(|e| PlayerError::Stream(format!("no se pudo lanzar yt-dlp: {e}")))
    }
}

#[async_trait]
impl StreamOpener for YtDlpStreamOpener {
    async fn open(&self, url: &str) -> Result<Input, PlayerError> {
        let canonical = normalize_youtube_url(url)
            .ok_or_else(|| PlayerError::Stream(format!("URL no normalizable: {url}")))?;

        info!("⬇️ Abriendo stream yt-dlp para: {}", canonical);

        let mut child = self.spawn_downloader(&canonical)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PlayerError::Stream("yt-dlp no entregó stdout".into()))?;

        // stderr se drena en un hilo aparte; el buffer se vuelca al log
        // cuando el stream termina o se aborta.
        let stderr_buf = Arc::new(Mutex::new(String::new()));
        if let Some(stderr) = child.stderr.take() {
            let buf = stderr_buf.clone();
            std::thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    let mut buf = buf.lock();
                    buf.push_str(&line);
                    buf.push('\n');
                }
            });
        }

        let stream = ChildStream {
            child,
            stdout,
            stderr: stderr_buf,
            url: canonical,
        };

        // Sondeo de contenedor/códec antes de entregar el stream al driver.
        // Si falla, soltar el Input mata el subproceso.
        let raw = Input::Live(
            LiveInput::Raw(AudioStream {
                input: Box::new(stream) as Box<dyn MediaSource>,
                hint: None,
            }),
            None,
        );

        raw.make_playable_async(get_codec_registry(), get_probe())
            .await
            .map_err(|e| PlayerError::Stream(format!("sondeo de formato falló: {e}")))
    }
}

/// stdout de yt-dlp expuesto como fuente de bytes no navegable. El driver
/// de voz es su único lector.
struct ChildStream {
    child: Child,
    stdout: ChildStdout,
    stderr: Arc<Mutex<String>>,
    url: String,
}

impl Read for ChildStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stdout.read(buf)
    }
}

impl Seek for ChildStream {
    fn seek(&mut self, _pos: SeekFrom) -> std::io::Result<u64> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "el stream de yt-dlp no es navegable",
        ))
    }
}

impl MediaSource for ChildStream {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

impl Drop for ChildStream {
    fn drop(&mut self) {
        match self.child.try_wait() {
            // Salida natural: un código distinto de cero se loguea con el
            // stderr capturado, pero no invalida el audio ya entregado.
            Ok(Some(status)) => {
                let stderr = self.stderr.lock();
                if !status.success() {
                    warn!(
                        "yt-dlp terminó con {} para {}: {}",
                        status,
                        self.url,
                        stderr.trim()
                    );
                } else if !stderr.trim().is_empty() {
                    debug!("avisos de yt-dlp para {}: {}", self.url, stderr.trim());
                }
            }
            // Stream abandonado (skip/stop) con el proceso aún vivo.
            Ok(None) => {
                let _ = self.child.kill();
                let _ = self.child.wait();
                debug!("subproceso yt-dlp terminado para {}", self.url);
            }
            Err(e) => warn!("no se pudo recoger el subproceso yt-dlp: {e}"),
        }
    }
}
