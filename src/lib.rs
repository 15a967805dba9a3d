//! Coordinador de sesiones de reproducción por guild.
//!
//! Una sesión por guild (la [`Queue`]), con todos sus comandos
//! serializados en orden de llegada, y un [`PlayerManager`] que es
//! dueño del mapa de sesiones y reacciona al ciclo de vida del
//! transporte de voz. La resolución de media, el pipeline de audio y la
//! conexión de voz son colaboradores externos detrás de traits; el
//! crate trae implementaciones sobre songbird y ffmpeg listas para un
//! bot de Discord.

pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod player;
pub mod song;
pub mod sources;
pub mod voice;

#[cfg(test)]
pub(crate) mod test_support;

pub use audio::{AudioFilter, AudioPipeline, FfmpegPipeline, MediaStream};
pub use config::Config;
pub use error::{ErrorKind, PlayerError};
pub use events::PlayerEvent;
pub use player::{LoopMode, PlayerManager, Queue, QueuePage, QueueSnapshot};
pub use song::{RelatedSong, Requester, Song, Uploader};
pub use sources::{RawTrackInfo, SongResolver, SourceKind};
pub use voice::{SongbirdVoice, VoiceTarget, VoiceTransport};
