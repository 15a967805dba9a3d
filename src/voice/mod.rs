//! Contratos del transporte de voz.
//!
//! El núcleo del reproductor no conoce Discord: habla con una conexión
//! abstracta que sabe reproducir streams y avisa, por un canal de
//! eventos, cuándo terminó un track, falló el driver o se cayó la
//! conexión. [`backend`] trae la implementación sobre songbird.

use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use std::time::Duration;

use crate::audio::MediaStream;

pub mod backend;

pub use backend::SongbirdVoice;

/// Destino de una conexión de voz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceTarget {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

/// Opciones de arranque de un stream.
#[derive(Debug, Clone, Copy)]
pub struct PlayOptions {
    /// Ganancia lineal, 1.0 = volumen nominal.
    pub gain: f32,
}

/// Eventos de ciclo de vida que emite el transporte.
///
/// El contrato es a-lo-sumo-uno de `Finished`/`Error` por intento de
/// reproducción, más `Disconnected` cuando muere la conexión.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// El track en curso terminó (fin natural o stop explícito).
    Finished,
    /// El driver reportó un error en el track en curso.
    Error(String),
    /// La conexión de voz se cerró; con detalle si fue por error.
    Disconnected(Option<String>),
}

/// Fábrica de conexiones de voz.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn join(&self, target: VoiceTarget) -> Result<Arc<dyn VoiceConnection>>;
}

/// Una conexión de voz viva sobre la cual reproducir audio.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Canal de eventos de ciclo de vida de esta conexión.
    fn events(&self) -> flume::Receiver<TransportEvent>;

    /// Reproduce un stream, reemplazando el track anterior si lo hay.
    async fn play(
        &self,
        stream: MediaStream,
        options: PlayOptions,
    ) -> Result<Arc<dyn AudioResource>>;

    async fn disconnect(&self) -> Result<()>;
}

/// Handle sobre el audio en curso de una conexión.
#[async_trait]
pub trait AudioResource: Send + Sync {
    fn pause(&self) -> Result<()>;
    fn resume(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;

    /// Ajusta la ganancia del track en vivo, 1.0 = nominal.
    fn set_gain(&self, gain: f32) -> Result<()>;

    /// Posición de reproducción dentro del stream actual.
    async fn position(&self) -> Duration;
}
