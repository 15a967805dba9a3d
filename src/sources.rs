use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::song::{RelatedSong, Requester, Song, Uploader};

#[cfg(test)]
use mockall::automock;

/// Orígenes de media reconocidos. Conjunto cerrado: agregar una fuente
/// nueva obliga a cubrir todos los `match` del crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    YouTube,
    SoundCloud,
    Spotify,
    Direct,
}

impl SourceKind {
    /// Clasifica una URL según su host.
    pub fn detect(raw_url: &str) -> SourceKind {
        let host = Url::parse(raw_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()));

        match host.as_deref() {
            Some(h) if h.ends_with("youtube.com") || h == "youtu.be" => SourceKind::YouTube,
            Some(h) if h.ends_with("soundcloud.com") => SourceKind::SoundCloud,
            Some(h) if h.ends_with("spotify.com") => SourceKind::Spotify,
            _ => SourceKind::Direct,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::YouTube => "YouTube",
            SourceKind::SoundCloud => "SoundCloud",
            SourceKind::Spotify => "Spotify",
            SourceKind::Direct => "Direct",
        }
    }
}

/// Extrae el id de video de una URL de YouTube.
pub fn extract_youtube_id(url: &str) -> Option<String> {
    let id_regex = Regex::new(
        r"(?:youtube\.com/(?:watch\?v=|embed/|v/)|youtu\.be/|music\.youtube\.com/watch\?v=)([A-Za-z0-9_-]{6,})",
    )
    .unwrap();

    id_regex
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Metadatos crudos tal como los entrega un resolver, antes de
/// normalizarlos a `Song`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTrackInfo {
    pub id: Option<String>,
    pub title: String,
    pub webpage_url: String,
    pub stream_url: Option<String>,
    pub duration_secs: Option<f64>,
    pub is_live: bool,
    pub thumbnail: Option<String>,
    pub uploader: Option<String>,
    pub uploader_url: Option<String>,
    pub related: Vec<RelatedSong>,
    /// Payload completo del extractor; se descarta al encolar.
    pub extra: Option<serde_json::Value>,
}

impl RawTrackInfo {
    /// Normaliza los metadatos crudos a una `Song`, deduciendo el origen
    /// desde la URL.
    pub fn into_song(self, requester: Requester) -> Song {
        let source = SourceKind::detect(&self.webpage_url);

        // Sin id del extractor, derivar uno estable de la URL
        let id = match (self.id, source) {
            (Some(id), _) => id,
            (None, SourceKind::YouTube) => {
                extract_youtube_id(&self.webpage_url).unwrap_or_else(|| self.webpage_url.clone())
            }
            (None, _) => self.webpage_url.clone(),
        };

        debug!("🧩 Normalizando track {} desde {}", id, source.name());

        let mut song = Song::new(id, self.title, self.webpage_url, source, requester)
            .with_live(self.is_live)
            .with_uploader(Uploader {
                name: self.uploader,
                url: self.uploader_url,
            })
            .with_related(self.related);

        if !song.is_live {
            if let Some(secs) = self.duration_secs {
                song.duration = Duration::from_secs_f64(secs.max(0.0));
            }
        }
        if let Some(stream_url) = self.stream_url {
            song.stream_url = Some(stream_url);
        }
        if let Some(thumbnail) = self.thumbnail {
            song.thumbnail = Some(thumbnail);
        }
        if let Some(extra) = self.extra {
            song.raw = Some(extra);
        }

        song
    }
}

/// Colaborador externo que convierte una URL o búsqueda en una `Song`.
///
/// Debe ser seguro llamarlo repetidas veces con la misma entrada: el
/// autoplay lo consulta una vez por candidata relacionada.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SongResolver: Send + Sync {
    async fn resolve(&self, requester: &Requester, query: &str) -> Result<Song>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::model::id::UserId;

    #[test]
    fn test_source_detection() {
        assert_eq!(
            SourceKind::detect("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            SourceKind::YouTube
        );
        assert_eq!(
            SourceKind::detect("https://youtu.be/dQw4w9WgXcQ"),
            SourceKind::YouTube
        );
        assert_eq!(
            SourceKind::detect("https://music.youtube.com/watch?v=test"),
            SourceKind::YouTube
        );
        assert_eq!(
            SourceKind::detect("https://soundcloud.com/artist/track"),
            SourceKind::SoundCloud
        );
        assert_eq!(
            SourceKind::detect("https://open.spotify.com/track/abc"),
            SourceKind::Spotify
        );
        assert_eq!(
            SourceKind::detect("https://example.com/audio.mp3"),
            SourceKind::Direct
        );
    }

    #[test]
    fn test_extract_youtube_id() {
        assert_eq!(
            extract_youtube_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            extract_youtube_id("https://youtu.be/dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(extract_youtube_id("https://example.com/video"), None);
    }

    #[test]
    fn test_normalize_raw_track() {
        let raw = RawTrackInfo {
            title: "Tema de prueba".to_string(),
            webpage_url: "https://youtu.be/dQw4w9WgXcQ".to_string(),
            duration_secs: Some(212.4),
            thumbnail: Some("https://i.ytimg.com/x.jpg".to_string()),
            uploader: Some("Canal".to_string()),
            extra: Some(serde_json::json!({"formats": []})),
            ..RawTrackInfo::default()
        };

        let song = raw.into_song(Requester::new(UserId::new(7), "tester"));
        assert_eq!(song.id, "dQw4w9WgXcQ");
        assert_eq!(song.source, SourceKind::YouTube);
        assert_eq!(song.duration.as_secs(), 212);
        assert!(song.raw.is_some());
        assert_eq!(song.requester.name, "tester");
    }

    #[test]
    fn test_live_track_ignores_duration() {
        let raw = RawTrackInfo {
            title: "Radio".to_string(),
            webpage_url: "https://example.com/radio".to_string(),
            duration_secs: Some(9999.0),
            is_live: true,
            ..RawTrackInfo::default()
        };

        let song = raw.into_song(Requester::new(UserId::new(7), "tester"));
        assert!(song.is_live);
        assert_eq!(song.duration, Duration::ZERO);
    }
}
