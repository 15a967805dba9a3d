use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::audio::filters::AudioFilter;
use crate::song::Song;

/// Stream de bytes ya decodificable, listo para entregar al transporte.
pub struct RawStream {
    pub reader: Box<dyn Read + Send + Sync>,
    pub byte_len: Option<u64>,
    /// Pista de contenedor para el probe del decodificador ("ogg", "mp3", ...)
    pub hint: Option<String>,
}

/// Salida del pipeline: bytes transformados o una URL que el transporte
/// puede consumir directo, sin re-codificar.
pub enum MediaStream {
    Raw(RawStream),
    Remote(String),
}

/// Colaborador externo que convierte una `Song` más un offset y una
/// cadena de filtros en audio reproducible.
#[async_trait]
pub trait AudioPipeline: Send + Sync {
    async fn open(
        &self,
        song: &Song,
        begin_time: Duration,
        filters: &[AudioFilter],
    ) -> Result<MediaStream>;
}

/// Pipeline por defecto basado en ffmpeg.
///
/// Sin filtros ni offset entrega la URL tal cual; en cualquier otro caso
/// re-decodifica con `-ss`/`-af` y emite ogg/opus a 48kHz estéreo.
pub struct FfmpegPipeline {
    ffmpeg_path: String,
}

impl FfmpegPipeline {
    pub fn new() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }

    pub fn with_path(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    /// Verifica que el binario de ffmpeg exista y responda.
    pub async fn verify_availability(&self) -> Result<()> {
        let output = tokio::process::Command::new(&self.ffmpeg_path)
            .arg("-version")
            .output()
            .await
            .with_context(|| format!("no se pudo ejecutar {}", self.ffmpeg_path))?;

        if !output.status.success() {
            anyhow::bail!("{} -version terminó con error", self.ffmpeg_path);
        }

        info!("✅ ffmpeg disponible");
        Ok(())
    }

    fn spawn_transcode(
        &self,
        input_url: &str,
        begin_time: Duration,
        filters: &[AudioFilter],
        live: bool,
    ) -> Result<FfmpegStream> {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.arg("-hide_banner").arg("-loglevel").arg("error");

        // El offset solo tiene sentido sobre media con duración conocida
        if !live && begin_time > Duration::ZERO {
            cmd.arg("-ss").arg(format!("{}", begin_time.as_secs_f64()));
        }

        cmd.arg("-i").arg(input_url);

        if !filters.is_empty() {
            cmd.arg("-af").arg(AudioFilter::chain(filters));
        }

        cmd.arg("-f")
            .arg("ogg")
            .arg("-c:a")
            .arg("libopus")
            .arg("-ar")
            .arg("48000")
            .arg("-ac")
            .arg("2")
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("no se pudo lanzar {}", self.ffmpeg_path))?;

        let stdout = child
            .stdout
            .take()
            .context("ffmpeg se lanzó sin stdout")?;

        Ok(FfmpegStream { child, stdout })
    }
}

impl Default for FfmpegPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioPipeline for FfmpegPipeline {
    async fn open(
        &self,
        song: &Song,
        begin_time: Duration,
        filters: &[AudioFilter],
    ) -> Result<MediaStream> {
        let input_url = song.stream_url.as_deref().unwrap_or(&song.url);

        // Passthrough: nada que transformar, que el transporte consuma la URL
        if filters.is_empty() && (begin_time == Duration::ZERO || song.is_live) {
            debug!("🎯 Passthrough directo para: {}", song.name);
            return Ok(MediaStream::Remote(input_url.to_string()));
        }

        info!(
            "🎛️ Transcodificando {} desde {:?} con filtros [{}]",
            song.name,
            begin_time,
            AudioFilter::chain(filters)
        );

        let stream = self.spawn_transcode(input_url, begin_time, filters, song.is_live)?;

        Ok(MediaStream::Raw(RawStream {
            reader: Box::new(stream),
            byte_len: None,
            hint: Some("ogg".to_string()),
        }))
    }
}

/// Proceso ffmpeg en vuelo; el stream es su stdout y el proceso muere
/// con el stream.
struct FfmpegStream {
    child: Child,
    stdout: ChildStdout,
}

impl Read for FfmpegStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stdout.read(buf)
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            debug!("ffmpeg ya había terminado: {}", e);
        }
        if let Err(e) = self.child.wait() {
            warn!("no se pudo cosechar el proceso ffmpeg: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::Requester;
    use crate::sources::SourceKind;
    use serenity::model::id::UserId;

    fn song() -> Song {
        Song::new(
            "x",
            "Tema",
            "https://example.com/audio.mp3",
            SourceKind::Direct,
            Requester::new(UserId::new(1), "tester"),
        )
        .with_stream_url("https://cdn.example.com/audio.mp3")
    }

    #[tokio::test]
    async fn test_passthrough_without_filters_or_offset() {
        let pipeline = FfmpegPipeline::new();
        let out = pipeline.open(&song(), Duration::ZERO, &[]).await.unwrap();
        match out {
            MediaStream::Remote(url) => assert_eq!(url, "https://cdn.example.com/audio.mp3"),
            MediaStream::Raw(_) => panic!("se esperaba passthrough directo"),
        }
    }

    #[tokio::test]
    async fn test_live_seek_is_passthrough() {
        let live = song().with_live(true);
        let pipeline = FfmpegPipeline::new();
        let out = pipeline
            .open(&live, Duration::from_secs(30), &[])
            .await
            .unwrap();
        assert!(matches!(out, MediaStream::Remote(_)));
    }
}
