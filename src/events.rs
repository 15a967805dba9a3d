use serenity::model::id::{ChannelId, GuildId};

use crate::player::Queue;
use crate::song::Song;

/// Notificaciones que el reproductor emite hacia la capa de aplicación
/// (mensajes de "now playing", embeds, etc.).
///
/// Se consumen desde el receiver que entrega `PlayerManager::events()`;
/// el flujo está pensado para un único consumidor.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// Se creó una sesión nueva.
    InitQueue { queue: Queue },
    /// Empezó a sonar una canción.
    PlaySong { queue: Queue, song: Song },
    /// Terminó de sonar una canción.
    FinishSong { queue: Queue, song: Song },
    /// Se encoló una canción.
    AddSong { queue: Queue, song: Song },
    /// Se encoló un lote de canciones.
    AddList { queue: Queue, songs: Vec<Song> },
    /// La cola se quedó sin canciones.
    QueueFinish { queue: Queue },
    /// Autoplay no encontró candidatas nuevas.
    NoRelated { queue: Queue },
    /// El transporte de voz se desconectó.
    Disconnect {
        guild_id: GuildId,
        error: Option<String>,
    },
    /// Error a mostrar en el canal de texto de la sesión.
    Error {
        guild_id: GuildId,
        channel: Option<ChannelId>,
        message: String,
    },
}
