//! Dobles de prueba para los colaboradores externos del reproductor.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::audio::{AudioFilter, AudioPipeline, MediaStream, RawStream};
use crate::config::Config;
use crate::events::PlayerEvent;
use crate::player::PlayerManager;
use crate::song::{RelatedSong, Requester, Song};
use crate::sources::{SongResolver, SourceKind};
use crate::voice::{
    AudioResource, PlayOptions, TransportEvent, VoiceConnection, VoiceTarget, VoiceTransport,
};

pub(crate) fn test_song(id: &str) -> Song {
    Song::new(
        id,
        format!("Canción {id}"),
        format!("https://example.com/{id}"),
        SourceKind::Direct,
        Requester::new(UserId::new(1), "tester"),
    )
    .with_duration(Duration::from_secs(180))
    .with_stream_url(format!("https://cdn.example.com/{id}"))
}

pub(crate) fn related(id: &str) -> RelatedSong {
    RelatedSong {
        id: id.to_string(),
        name: format!("Canción {id}"),
        url: format!("https://example.com/{id}"),
    }
}

pub(crate) fn target(guild: u64) -> VoiceTarget {
    VoiceTarget {
        guild_id: GuildId::new(guild),
        channel_id: ChannelId::new(guild * 10),
    }
}

/// Track falso en curso. `stop`/`finish` emiten `Finished` a lo sumo
/// una vez, como el transporte real.
pub(crate) struct FakeResource {
    pub stopped: AtomicBool,
    pub paused: AtomicBool,
    pub gain: Mutex<f32>,
    pub position: Mutex<Duration>,
    tx: flume::Sender<TransportEvent>,
}

impl FakeResource {
    fn new(tx: flume::Sender<TransportEvent>) -> Self {
        Self {
            stopped: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            gain: Mutex::new(1.0),
            position: Mutex::new(Duration::ZERO),
            tx,
        }
    }

    /// Simula el fin natural del track.
    pub(crate) fn finish(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(TransportEvent::Finished);
        }
    }
}

#[async_trait]
impl AudioResource for FakeResource {
    fn pause(&self) -> Result<()> {
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(TransportEvent::Finished);
        }
        Ok(())
    }

    fn set_gain(&self, gain: f32) -> Result<()> {
        *self.gain.lock() = gain;
        Ok(())
    }

    async fn position(&self) -> Duration {
        *self.position.lock()
    }
}

/// Conexión de voz falsa: registra cada `play` y deja inyectar eventos
/// de transporte arbitrarios por `tx`.
pub(crate) struct FakeConnection {
    pub tx: flume::Sender<TransportEvent>,
    rx: flume::Receiver<TransportEvent>,
    pub current: Mutex<Option<Arc<FakeResource>>>,
    pub plays: AtomicUsize,
    pub disconnected: AtomicBool,
    /// Cantidad de `play` que deben fallar antes de volver a funcionar.
    pub fail_next_plays: AtomicUsize,
}

impl FakeConnection {
    pub(crate) fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            tx,
            rx,
            current: Mutex::new(None),
            plays: AtomicUsize::new(0),
            disconnected: AtomicBool::new(false),
            fail_next_plays: AtomicUsize::new(0),
        }
    }

    pub(crate) fn current_resource(&self) -> Option<Arc<FakeResource>> {
        self.current.lock().clone()
    }

    /// Termina naturalmente el track en curso.
    pub(crate) fn finish_current(&self) {
        if let Some(resource) = self.current_resource() {
            resource.finish();
        }
    }
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    fn events(&self) -> flume::Receiver<TransportEvent> {
        self.rx.clone()
    }

    async fn play(
        &self,
        _stream: MediaStream,
        options: PlayOptions,
    ) -> Result<Arc<dyn AudioResource>> {
        if self
            .fail_next_plays
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
            .is_ok()
        {
            anyhow::bail!("fallo de transporte simulado");
        }

        // Reemplazar el track anterior lo detiene, igual que el driver real
        if let Some(previous) = self.current.lock().take() {
            let _ = previous.stop();
        }

        let resource = Arc::new(FakeResource::new(self.tx.clone()));
        *resource.gain.lock() = options.gain;
        *self.current.lock() = Some(resource.clone());
        self.plays.fetch_add(1, Ordering::SeqCst);
        Ok(resource)
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) struct FakeTransport {
    pub connections: Mutex<Vec<Arc<FakeConnection>>>,
    pub join_calls: AtomicUsize,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self {
            connections: Mutex::new(Vec::new()),
            join_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn last_connection(&self) -> Arc<FakeConnection> {
        self.connections
            .lock()
            .last()
            .expect("ningún join registrado")
            .clone()
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn join(&self, _target: VoiceTarget) -> Result<Arc<dyn VoiceConnection>> {
        self.join_calls.fetch_add(1, Ordering::SeqCst);
        let connection = Arc::new(FakeConnection::new());
        self.connections.lock().push(connection.clone());
        Ok(connection)
    }
}

/// Pipeline falso: registra cada apertura y puede fallar por id.
pub(crate) struct FakePipeline {
    pub fail_for: Mutex<HashSet<String>>,
    pub opened: Mutex<Vec<(String, Duration, Vec<AudioFilter>)>>,
}

impl FakePipeline {
    pub(crate) fn new() -> Self {
        Self {
            fail_for: Mutex::new(HashSet::new()),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn break_song(&self, id: &str) {
        self.fail_for.lock().insert(id.to_string());
    }
}

#[async_trait]
impl AudioPipeline for FakePipeline {
    async fn open(
        &self,
        song: &Song,
        begin_time: Duration,
        filters: &[AudioFilter],
    ) -> Result<MediaStream> {
        if self.fail_for.lock().contains(&song.id) {
            anyhow::bail!("pipeline roto para {}", song.id);
        }
        self.opened
            .lock()
            .push((song.id.clone(), begin_time, filters.to_vec()));

        if filters.is_empty() && begin_time == Duration::ZERO {
            Ok(MediaStream::Remote(song.url.clone()))
        } else {
            Ok(MediaStream::Raw(RawStream {
                reader: Box::new(std::io::empty()),
                byte_len: None,
                hint: Some("ogg".to_string()),
            }))
        }
    }
}

/// Resolver falso con un catálogo url → canción.
pub(crate) struct FakeResolver {
    pub catalog: Mutex<HashMap<String, Song>>,
    pub calls: AtomicUsize,
}

impl FakeResolver {
    pub(crate) fn new() -> Self {
        Self {
            catalog: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn register(&self, song: Song) {
        self.catalog.lock().insert(song.url.clone(), song);
    }
}

#[async_trait]
impl SongResolver for FakeResolver {
    async fn resolve(&self, requester: &Requester, query: &str) -> Result<Song> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut song = self
            .catalog
            .lock()
            .get(query)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no se pudo resolver {query}"))?;
        song.requester = requester.clone();
        Ok(song)
    }
}

/// Manager con todos los colaboradores falsos.
pub(crate) struct Harness {
    pub manager: PlayerManager,
    pub transport: Arc<FakeTransport>,
    pub resolver: Arc<FakeResolver>,
    pub pipeline: Arc<FakePipeline>,
    pub events: flume::Receiver<PlayerEvent>,
}

/// Logging opcional para depurar tests (`RUST_LOG=open_player=debug`).
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub(crate) fn harness() -> Harness {
    harness_with(Config::default())
}

pub(crate) fn harness_with(config: Config) -> Harness {
    init_tracing();
    let transport = Arc::new(FakeTransport::new());
    let resolver = Arc::new(FakeResolver::new());
    let pipeline = Arc::new(FakePipeline::new());
    let manager = PlayerManager::new(
        config,
        transport.clone(),
        resolver.clone(),
        pipeline.clone(),
    );
    let events = manager.events();
    Harness {
        manager,
        transport,
        resolver,
        pipeline,
        events,
    }
}

/// Espera el próximo evento con un timeout razonable.
pub(crate) async fn next_event(rx: &flume::Receiver<PlayerEvent>) -> PlayerEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv_async())
        .await
        .expect("timeout esperando un evento del reproductor")
        .expect("canal de eventos cerrado")
}

/// Reintenta una condición hasta que se cumpla o se agote el plazo.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("la condición esperada nunca se cumplió");
}
