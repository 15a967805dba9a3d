use serenity::model::id::GuildId;
use thiserror::Error;

/// Categoría gruesa de un error del reproductor.
///
/// Útil para decidir cómo presentar el error al usuario sin hacer
/// match sobre cada variante concreta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Argumento con valor o tipo inválido
    InvalidInput,
    /// Operación no válida en el estado actual
    StateConflict,
    /// No existe la sesión/canción pedida
    NotFound,
    /// Operación deshabilitada por configuración
    FeatureDisabled,
    /// Fallo del resolver o del pipeline externo
    Resolution,
    /// Fallo de la conexión de voz
    Transport,
}

/// Errores del reproductor y de sus colas por guild.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("entrada inválida: {0}")]
    InvalidInput(String),

    #[error("la reproducción ya está pausada")]
    AlreadyPaused,

    #[error("la reproducción no está pausada")]
    AlreadyPlaying,

    #[error("no hay una canción siguiente a la cual saltar")]
    NoNextSong,

    #[error("no hay canciones anteriores en el historial")]
    NoPreviousSong,

    #[error("posición de canción inválida")]
    InvalidSong,

    #[error("no hay ninguna canción reproduciéndose")]
    NoPlayingSong,

    #[error("no quedan canciones relacionadas por reproducir")]
    NoRelatedSong,

    #[error("función deshabilitada por configuración: {0}")]
    FeatureDisabled(&'static str),

    #[error("la cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    #[error("ya existe una cola para el guild {0}")]
    QueueExists(GuildId),

    #[error("no existe una cola para el guild {0}")]
    NoQueue(GuildId),

    #[error("error al resolver la canción: {0}")]
    Resolve(anyhow::Error),

    #[error("error del pipeline de audio: {0}")]
    Pipeline(anyhow::Error),

    #[error("error del transporte de voz: {0}")]
    Transport(anyhow::Error),

    /// La cola fue destruida mientras la operación esperaba su turno.
    #[error("la cola fue terminada")]
    Terminated,
}

impl PlayerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::InvalidSong => ErrorKind::InvalidInput,
            Self::AlreadyPaused
            | Self::AlreadyPlaying
            | Self::NoNextSong
            | Self::QueueFull(_)
            | Self::QueueExists(_)
            | Self::Terminated => ErrorKind::StateConflict,
            Self::NoPreviousSong
            | Self::NoPlayingSong
            | Self::NoRelatedSong
            | Self::NoQueue(_) => ErrorKind::NotFound,
            Self::FeatureDisabled(_) => ErrorKind::FeatureDisabled,
            Self::Resolve(_) | Self::Pipeline(_) => ErrorKind::Resolution,
            Self::Transport(_) => ErrorKind::Transport,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(PlayerError::AlreadyPaused.kind(), ErrorKind::StateConflict);
        assert_eq!(PlayerError::NoPreviousSong.kind(), ErrorKind::NotFound);
        assert_eq!(PlayerError::InvalidSong.kind(), ErrorKind::InvalidInput);
        assert_eq!(
            PlayerError::FeatureDisabled("historial").kind(),
            ErrorKind::FeatureDisabled
        );
    }
}
