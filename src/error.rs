use thiserror::Error;

/// Errores del motor de reproducción. Todos están acotados a la cola de una
/// guild; ninguno es fatal para el proceso.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// Ninguna fuente reproducible para la consulta del usuario.
    #[error("no se encontró una fuente reproducible para: {0}")]
    Resolution(String),

    /// Fallo al lanzar el subproceso de descarga o al sondear el formato.
    #[error("fallo de streaming: {0}")]
    Stream(String),

    /// La sesión de voz no se pudo establecer.
    #[error("no se pudo establecer la sesión de voz: {0}")]
    Session(String),

    /// La sesión de voz no llegó a estar lista dentro del límite.
    #[error("tiempo de espera agotado al conectar al canal de voz")]
    ConnectTimeout,

    /// Skip sin nada reproduciéndose.
    #[error("no hay nada reproduciéndose")]
    NotPlaying,

    /// Stop sin cola activa.
    #[error("no hay una cola activa")]
    NotQueued,
}
