use anyhow::{Context, Result};
use async_trait::async_trait;
use songbird::{
    input::{AudioStream, HttpRequest, Input, LiveInput},
    tracks::TrackHandle,
    Call, CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;
use std::time::Duration;
use symphonia::core::io::MediaSource;
use symphonia::core::probe::Hint;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::audio::MediaStream as PipelineMedia;
use crate::voice::{AudioResource, PlayOptions, TransportEvent, VoiceConnection, VoiceTarget, VoiceTransport};

/// Transporte de voz sobre songbird.
///
/// El manager de songbird llega del host (registrado en el cliente de
/// serenity); este adaptador solo abre conexiones y las envuelve en el
/// contrato del reproductor.
pub struct SongbirdVoice {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdVoice {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdVoice {
    async fn join(&self, target: VoiceTarget) -> Result<Arc<dyn VoiceConnection>> {
        info!(
            "🔌 Uniéndose al canal de voz {} en guild {}",
            target.channel_id, target.guild_id
        );

        let call = self
            .manager
            .join(target.guild_id, target.channel_id)
            .await
            .context("no se pudo unir al canal de voz")?;

        let (tx, rx) = flume::unbounded();

        // Un solo handler global por conexión: las desconexiones no
        // pertenecen a ningún track en particular
        {
            let mut call_lock = call.lock().await;
            call_lock.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DisconnectNotifier { tx: tx.clone() },
            );
        }

        Ok(Arc::new(SongbirdConnection {
            call,
            http: self.http.clone(),
            tx,
            rx,
        }))
    }
}

struct SongbirdConnection {
    call: Arc<Mutex<Call>>,
    http: reqwest::Client,
    tx: flume::Sender<TransportEvent>,
    rx: flume::Receiver<TransportEvent>,
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    fn events(&self) -> flume::Receiver<TransportEvent> {
        self.rx.clone()
    }

    async fn play(
        &self,
        stream: PipelineMedia,
        options: PlayOptions,
    ) -> Result<Arc<dyn AudioResource>> {
        let input: Input = match stream {
            PipelineMedia::Remote(url) => {
                debug!("🎯 Input HTTP directo: {}", url);
                Input::from(HttpRequest::new(self.http.clone(), url))
            }
            PipelineMedia::Raw(raw) => {
                let mut hint = Hint::new();
                if let Some(ext) = &raw.hint {
                    hint.with_extension(ext);
                }
                let source = StreamMediaSource {
                    inner: raw.reader,
                    byte_len: raw.byte_len,
                };
                Input::Live(
                    LiveInput::Raw(AudioStream {
                        input: Box::new(source),
                        hint: Some(hint),
                    }),
                    None,
                )
            }
        };

        // play_only reemplaza cualquier track anterior de esta llamada
        let handle = {
            let mut call_lock = self.call.lock().await;
            call_lock.play_only_input(input)
        };

        if let Err(e) = handle.set_volume(options.gain) {
            debug!("no se pudo fijar el volumen inicial: {}", e);
        }

        handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndNotifier {
                    tx: self.tx.clone(),
                },
            )
            .context("no se pudo registrar el handler de fin de track")?;

        handle
            .add_event(
                Event::Track(TrackEvent::Error),
                TrackErrorNotifier {
                    tx: self.tx.clone(),
                },
            )
            .context("no se pudo registrar el handler de errores de track")?;

        Ok(Arc::new(SongbirdResource { handle }))
    }

    async fn disconnect(&self) -> Result<()> {
        let mut call_lock = self.call.lock().await;
        call_lock
            .leave()
            .await
            .context("no se pudo abandonar el canal de voz")?;
        info!("👋 Conexión de voz cerrada");
        Ok(())
    }
}

/// Handle del track en curso.
struct SongbirdResource {
    handle: TrackHandle,
}

#[async_trait]
impl AudioResource for SongbirdResource {
    fn pause(&self) -> Result<()> {
        self.handle.pause().context("no se pudo pausar el track")
    }

    fn resume(&self) -> Result<()> {
        self.handle.play().context("no se pudo reanudar el track")
    }

    fn stop(&self) -> Result<()> {
        self.handle.stop().context("no se pudo detener el track")
    }

    fn set_gain(&self, gain: f32) -> Result<()> {
        self.handle
            .set_volume(gain)
            .context("no se pudo ajustar el volumen")
    }

    async fn position(&self) -> Duration {
        match self.handle.get_info().await {
            Ok(info) => info.position,
            Err(_) => Duration::ZERO,
        }
    }
}

/// Notifica el fin del track en curso.
struct TrackEndNotifier {
    tx: flume::Sender<TransportEvent>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        debug!("🎵 Track terminado");
        let _ = self.tx.send(TransportEvent::Finished);
        None
    }
}

/// Notifica errores del driver sobre el track en curso.
struct TrackErrorNotifier {
    tx: flume::Sender<TransportEvent>,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                error!("❌ Error en track: {:?}", state.playing);
                let _ = self
                    .tx
                    .send(TransportEvent::Error(format!("{:?}", state.playing)));
            }
        }
        None
    }
}

/// Notifica la caída de la conexión de voz.
struct DisconnectNotifier {
    tx: flume::Sender<TransportEvent>,
}

#[async_trait]
impl VoiceEventHandler for DisconnectNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::DriverDisconnect(data) = ctx {
            let reason = data.reason.as_ref().map(|r| format!("{r:?}"));
            debug!("🔌 Desconexión de voz: {:?}", reason);
            let _ = self.tx.send(TransportEvent::Disconnected(reason));
        }
        None
    }
}

/// Adapta el stream del pipeline al `MediaSource` que consume el probe
/// de symphonia. Solo lectura secuencial.
struct StreamMediaSource {
    inner: Box<dyn Read + Send + Sync>,
    byte_len: Option<u64>,
}

impl Read for StreamMediaSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for StreamMediaSource {
    fn seek(&mut self, _pos: SeekFrom) -> std::io::Result<u64> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "stream no posicionable",
        ))
    }
}

impl MediaSource for StreamMediaSource {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        self.byte_len
    }
}
