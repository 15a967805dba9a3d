use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::model::id::UserId;
use std::time::Duration;

use crate::sources::SourceKind;

/// Quién pidió la canción.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub id: UserId,
    pub name: String,
}

impl Requester {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Información del canal/artista que subió la canción.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Uploader {
    pub name: Option<String>,
    pub url: Option<String>,
}

/// Referencia liviana a una canción relacionada, candidata para autoplay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedSong {
    pub id: String,
    pub name: String,
    pub url: String,
}

/// Una canción reproducible. Inmutable una vez en cola, salvo por el
/// descarte de `raw` al encolarse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    pub name: String,
    /// Duración total; cero para transmisiones en vivo.
    pub duration: Duration,
    pub is_live: bool,
    pub url: String,
    pub stream_url: Option<String>,
    pub thumbnail: Option<String>,
    pub uploader: Uploader,
    pub related: Vec<RelatedSong>,
    pub requester: Requester,
    pub source: SourceKind,
    pub added_at: DateTime<Utc>,
    /// Metadatos crudos del resolver. Se descartan al encolar para
    /// acotar el uso de memoria.
    pub raw: Option<serde_json::Value>,
}

impl Song {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
        source: SourceKind,
        requester: Requester,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            duration: Duration::ZERO,
            is_live: false,
            url: url.into(),
            stream_url: None,
            thumbnail: None,
            uploader: Uploader::default(),
            related: Vec::new(),
            requester,
            source,
            added_at: Utc::now(),
            raw: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_live(mut self, is_live: bool) -> Self {
        self.is_live = is_live;
        if is_live {
            self.duration = Duration::ZERO;
        }
        self
    }

    pub fn with_stream_url(mut self, stream_url: impl Into<String>) -> Self {
        self.stream_url = Some(stream_url.into());
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn with_uploader(mut self, uploader: Uploader) -> Self {
        self.uploader = uploader;
        self
    }

    pub fn with_related(mut self, related: Vec<RelatedSong>) -> Self {
        self.related = related;
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Descarta los metadatos pesados del resolver una vez encolada.
    pub fn strip_metadata(&mut self) {
        self.raw = None;
    }

    /// Duración legible, `en vivo` para streams.
    pub fn formatted_duration(&self) -> String {
        if self.is_live {
            return "en vivo".to_string();
        }
        humantime::format_duration(Duration::from_secs(self.duration.as_secs())).to_string()
    }
}
