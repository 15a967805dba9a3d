use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Audio
    pub default_volume: f32, // Porcentaje, 100.0 = volumen nominal

    // Límites
    pub max_queue_size: usize,
    pub max_previous_songs: usize,
    pub max_play_retries: u8, // Intentos de arranque por avance antes de rendirse

    // Comportamiento de la sesión
    pub save_previous_songs: bool,
    pub leave_on_stop: bool,
    pub leave_on_finish: bool,

    // Features
    pub default_autoplay: bool,
    pub emit_new_song_only: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "50".to_string())
                .parse()?,

            // Límites
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            max_previous_songs: std::env::var("MAX_PREVIOUS_SONGS")
                .unwrap_or_else(|_| "50".to_string())
                .parse()?,
            max_play_retries: std::env::var("MAX_PLAY_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,

            // Comportamiento
            save_previous_songs: std::env::var("SAVE_PREVIOUS_SONGS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,
            leave_on_stop: std::env::var("LEAVE_ON_STOP")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,
            leave_on_finish: std::env::var("LEAVE_ON_FINISH")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,

            // Features
            default_autoplay: std::env::var("DEFAULT_AUTOPLAY")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,
            emit_new_song_only: std::env::var("EMIT_NEW_SONG_ONLY")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Verifica que los valores de configuración sean coherentes.
    pub fn validate(&self) -> Result<()> {
        if !self.default_volume.is_finite() || self.default_volume < 0.0 {
            anyhow::bail!(
                "El volumen por defecto debe ser un número no negativo, se recibió: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("El tamaño máximo de la cola debe ser mayor que 0");
        }

        if self.save_previous_songs && self.max_previous_songs == 0 {
            anyhow::bail!("El historial está habilitado pero su tamaño máximo es 0");
        }

        if self.max_play_retries == 0 {
            anyhow::bail!("Se necesita al menos 1 intento de reproducción por avance");
        }

        Ok(())
    }

    /// Resumen de la configuración actual, apto para logging.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Audio: {}% vol\n  \
            Límites: {} cola, {} historial, {} reintentos\n  \
            Sesión: historial={}, leave_on_stop={}, leave_on_finish={}\n  \
            Features: autoplay={}, emit_new_song_only={}",
            self.default_volume as u32,
            self.max_queue_size,
            self.max_previous_songs,
            self.max_play_retries,
            self.save_previous_songs,
            self.leave_on_stop,
            self.leave_on_finish,
            self.default_autoplay,
            self.emit_new_song_only
        )
    }
}

/// Valores por defecto, usados cuando no hay variables de entorno.
impl Default for Config {
    fn default() -> Self {
        Self {
            default_volume: 50.0,
            max_queue_size: 1000,
            max_previous_songs: 50,
            max_play_retries: 3,
            save_previous_songs: true,
            leave_on_stop: true,
            leave_on_finish: false,
            default_autoplay: false,
            emit_new_song_only: false,
        }
    }
}
