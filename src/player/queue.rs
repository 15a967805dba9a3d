use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rand::seq::SliceRandom;
use serenity::model::id::{ChannelId, GuildId};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audio::{AudioFilter, AudioPipeline, MediaStream};
use crate::config::Config;
use crate::error::PlayerError;
use crate::events::PlayerEvent;
use crate::player::task_queue::TaskQueue;
use crate::song::Song;
use crate::sources::SongResolver;
use crate::voice::{AudioResource, PlayOptions, VoiceConnection, VoiceTarget};

/// Modo de repetición de la cola.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Off,
    Track,
    Queue,
}

impl LoopMode {
    /// Siguiente modo en el ciclo Off → Track → Queue → Off.
    fn cycled(self) -> LoopMode {
        match self {
            LoopMode::Off => LoopMode::Track,
            LoopMode::Track => LoopMode::Queue,
            LoopMode::Queue => LoopMode::Off,
        }
    }
}

/// Transición pendiente para el próximo avance, computada al momento
/// del comando que la pide.
#[derive(Debug, Clone, Default)]
pub(crate) enum Pending {
    #[default]
    None,
    /// Avanzar sí o sí, incluso bajo repetir-track
    Skip,
    /// Volver a reproducir la cabeza desde el inicio
    Replay,
    /// Re-insertar estas canciones al frente antes de reproducir
    Back(Vec<Song>),
}

/// Resultado del avance de estado.
pub(crate) struct Advanced {
    /// La canción que estaba sonando, si había alguna.
    pub finished: Option<Song>,
    /// La misma cabeza vuelve a sonar (repetir-track o re-afirmación).
    pub replayed: bool,
}

/// Estado mutable de una sesión. Solo se toca bajo el serializador de
/// la sesión; el lock existe para los getters concurrentes.
pub(crate) struct QueueState {
    pub songs: VecDeque<Song>,
    pub previous: Vec<Song>,
    pub playing: bool,
    pub paused: bool,
    pub stopped: bool,
    pub pending: Pending,
    pub repeat: LoopMode,
    pub autoplay: bool,
    pub volume: f32,
    pub begin_time: Duration,
    pub filters: Vec<AudioFilter>,
}

impl QueueState {
    fn new(songs: VecDeque<Song>, config: &Config) -> Self {
        Self {
            songs,
            previous: Vec::new(),
            playing: false,
            paused: false,
            stopped: false,
            pending: Pending::None,
            repeat: LoopMode::Off,
            autoplay: config.default_autoplay,
            volume: config.default_volume,
            begin_time: Duration::ZERO,
            filters: Vec::new(),
        }
    }

    /// Transición de avance: decide qué suena después de que terminó la
    /// cabeza actual, consumiendo la transición pendiente.
    pub(crate) fn advance(&mut self, config: &Config) -> Advanced {
        let finished = self.songs.front().cloned();
        let pending = std::mem::take(&mut self.pending);
        let mut replayed = false;

        match pending {
            Pending::Back(slice) => {
                // La canción que sonaba conserva su lugar detrás del slice
                for song in slice.into_iter().rev() {
                    self.songs.push_front(song);
                }
            }
            Pending::Replay => replayed = true,
            Pending::None if self.repeat == LoopMode::Track => replayed = true,
            Pending::None | Pending::Skip => {
                if let Some(done) = self.songs.pop_front() {
                    if config.save_previous_songs {
                        self.archive(done.clone(), config.max_previous_songs);
                    }
                    if self.repeat == LoopMode::Queue {
                        self.songs.push_back(done);
                    }
                }
            }
        }

        self.begin_time = Duration::ZERO;
        Advanced { finished, replayed }
    }

    fn archive(&mut self, song: Song, cap: usize) {
        self.previous.push(song);
        if self.previous.len() > cap {
            self.previous.remove(0);
        }
    }
}

/// Vista inmutable de la cola para la capa de presentación.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub current: Option<Song>,
    pub upcoming: Vec<Song>,
    pub total_items: usize,
    pub repeat: LoopMode,
    pub autoplay: bool,
    pub total_duration: Duration,
}

impl QueueSnapshot {
    /// Una página de las canciones por venir.
    pub fn page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let safe_page = page.max(1);
        let start = (safe_page - 1) * items_per_page;
        let end = (start + items_per_page).min(self.upcoming.len());
        let total_pages = if self.upcoming.is_empty() {
            1
        } else {
            self.upcoming.len().div_ceil(items_per_page)
        };

        QueuePage {
            items: if start < self.upcoming.len() {
                self.upcoming[start..end].to_vec()
            } else {
                Vec::new()
            },
            current_page: safe_page,
            total_pages,
            total_items: self.upcoming.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<Song>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

/// Colaboradores compartidos que toda sesión necesita.
pub(crate) struct QueueContext {
    pub sessions: Arc<DashMap<GuildId, Queue>>,
    pub resolver: Arc<dyn SongResolver>,
    pub pipeline: Arc<dyn AudioPipeline>,
    pub events: flume::Sender<PlayerEvent>,
    pub config: Arc<Config>,
}

pub(crate) struct QueueCore {
    pub guild_id: GuildId,
    pub text_channel: Option<ChannelId>,
    pub voice_target: VoiceTarget,
    pub state: RwLock<QueueState>,
    pub tasks: TaskQueue,
    pub voice: Arc<dyn VoiceConnection>,
    pub resource: Mutex<Option<Arc<dyn AudioResource>>>,
    /// Fines de track a absorber: los dispara el reemplazo del stream
    /// en un seek o cambio de filtros, no un fin real.
    pub swallowed_finishes: AtomicUsize,
    pub sessions: Arc<DashMap<GuildId, Queue>>,
    pub resolver: Arc<dyn SongResolver>,
    pub pipeline: Arc<dyn AudioPipeline>,
    pub events: flume::Sender<PlayerEvent>,
    pub config: Arc<Config>,
    pub shutdown: CancellationToken,
}

/// Una sesión de reproducción por guild. Clonar es barato: todas las
/// copias comparten la misma sesión.
#[derive(Clone)]
pub struct Queue {
    pub(crate) inner: Arc<QueueCore>,
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("guild_id", &self.inner.guild_id)
            .finish()
    }
}

impl Queue {
    pub(crate) fn new(
        voice_target: VoiceTarget,
        text_channel: Option<ChannelId>,
        mut songs: Vec<Song>,
        voice: Arc<dyn VoiceConnection>,
        ctx: QueueContext,
    ) -> Self {
        for song in &mut songs {
            song.strip_metadata();
        }

        Self {
            inner: Arc::new(QueueCore {
                guild_id: voice_target.guild_id,
                text_channel,
                voice_target,
                state: RwLock::new(QueueState::new(songs.into(), &ctx.config)),
                tasks: TaskQueue::new(),
                voice,
                resource: Mutex::new(None),
                swallowed_finishes: AtomicUsize::new(0),
                sessions: ctx.sessions,
                resolver: ctx.resolver,
                pipeline: ctx.pipeline,
                events: ctx.events,
                config: ctx.config,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    // ---- Operaciones mutadoras (serializadas) ----

    /// Inserta canciones en la posición dada (por defecto al final).
    /// La posición 0 es la canción en reproducción y no se puede desplazar.
    pub async fn add_to_queue(
        &self,
        songs: Vec<Song>,
        position: Option<usize>,
    ) -> Result<usize, PlayerError> {
        if songs.is_empty() {
            return Err(PlayerError::InvalidInput(
                "no hay canciones para encolar".to_string(),
            ));
        }
        if position == Some(0) {
            return Err(PlayerError::InvalidInput(
                "no se puede insertar antes de la canción en reproducción".to_string(),
            ));
        }

        let this = self.clone();
        self.inner
            .tasks
            .run(async move {
                let mut songs = songs;
                for song in &mut songs {
                    song.strip_metadata();
                }

                let added = songs.clone();
                {
                    let mut state = this.inner.state.write();
                    if state.songs.len() + songs.len() > this.inner.config.max_queue_size {
                        return Err(PlayerError::QueueFull(this.inner.config.max_queue_size));
                    }
                    let at = position
                        .map(|p| p.min(state.songs.len()))
                        .unwrap_or(state.songs.len());
                    for (offset, song) in songs.into_iter().enumerate() {
                        state.songs.insert(at + offset, song);
                    }
                }

                info!(
                    "➕ {} canción(es) agregadas a la cola de guild {}",
                    added.len(),
                    this.inner.guild_id
                );

                let count = added.len();
                if count == 1 {
                    let mut added = added;
                    this.emit(PlayerEvent::AddSong {
                        queue: this.clone(),
                        song: added.remove(0),
                    });
                } else {
                    this.emit(PlayerEvent::AddList {
                        queue: this.clone(),
                        songs: added,
                    });
                }

                Ok(count)
            })
            .await
    }

    pub async fn pause(&self) -> Result<(), PlayerError> {
        let this = self.clone();
        self.inner
            .tasks
            .run(async move {
                if this.inner.state.read().paused {
                    return Err(PlayerError::AlreadyPaused);
                }

                if let Some(resource) = this.current_resource() {
                    resource.pause().map_err(PlayerError::Transport)?;
                }

                let mut state = this.inner.state.write();
                state.paused = true;
                state.playing = false;
                info!("⏸️ Reproducción pausada en guild {}", this.inner.guild_id);
                Ok(())
            })
            .await
    }

    pub async fn resume(&self) -> Result<(), PlayerError> {
        let this = self.clone();
        self.inner
            .tasks
            .run(async move {
                if !this.inner.state.read().paused {
                    return Err(PlayerError::AlreadyPlaying);
                }

                if let Some(resource) = this.current_resource() {
                    resource.resume().map_err(PlayerError::Transport)?;
                }

                let mut state = this.inner.state.write();
                state.paused = false;
                state.playing = true;
                info!("▶️ Reproducción reanudada en guild {}", this.inner.guild_id);
                Ok(())
            })
            .await
    }

    /// Detiene la sesión de forma terminal y la quita del manager.
    pub async fn stop(&self) -> Result<(), PlayerError> {
        let this = self.clone();
        self.inner
            .tasks
            .run(async move {
                let leave = this.inner.config.leave_on_stop;
                this.terminate(leave).await;
                info!("⏹️ Sesión detenida en guild {}", this.inner.guild_id);
                Ok(())
            })
            .await
    }

    pub async fn set_volume(&self, percent: f32) -> Result<(), PlayerError> {
        if !percent.is_finite() || percent < 0.0 {
            return Err(PlayerError::InvalidInput(format!(
                "el volumen debe ser un número no negativo, se recibió {percent}"
            )));
        }

        let this = self.clone();
        self.inner
            .tasks
            .run(async move {
                this.inner.state.write().volume = percent;
                if let Some(resource) = this.current_resource() {
                    resource
                        .set_gain(percent / 100.0)
                        .map_err(PlayerError::Transport)?;
                }
                info!(
                    "🔊 Volumen ajustado a {}% en guild {}",
                    percent, this.inner.guild_id
                );
                Ok(())
            })
            .await
    }

    /// Salta la canción actual. El avance corre cuando el transporte
    /// reporta el fin del track detenido.
    pub async fn skip(&self) -> Result<(), PlayerError> {
        let this = self.clone();
        self.inner
            .tasks
            .run(async move {
                {
                    let mut state = this.inner.state.write();
                    if state.songs.len() <= 1 && !state.autoplay {
                        return Err(PlayerError::NoNextSong);
                    }
                    state.pending = Pending::Skip;
                }
                info!("⏭️ Skip en guild {}", this.inner.guild_id);
                this.stop_current_track();
                Ok(())
            })
            .await
    }

    /// Vuelve a la canción anterior del historial; bajo repetir-cola con
    /// historial vacío, a la última de la lista.
    pub async fn previous(&self) -> Result<Song, PlayerError> {
        let this = self.clone();
        self.inner
            .tasks
            .run(async move {
                let target = {
                    let mut state = this.inner.state.write();
                    if !this.inner.config.save_previous_songs {
                        return Err(PlayerError::FeatureDisabled("historial de canciones"));
                    }

                    let target = if let Some(song) = state.previous.pop() {
                        song
                    } else if state.repeat == LoopMode::Queue {
                        state.songs.pop_back().ok_or(PlayerError::NoPreviousSong)?
                    } else {
                        return Err(PlayerError::NoPreviousSong);
                    };

                    state.pending = Pending::Back(vec![target.clone()]);
                    target
                };

                info!("⏮️ Volviendo a {} en guild {}", target.name, this.inner.guild_id);
                this.stop_current_track();
                Ok(target)
            })
            .await
    }

    /// Mezcla todo menos la cabeza con un Fisher–Yates uniforme.
    pub async fn shuffle(&self) -> Result<(), PlayerError> {
        let this = self.clone();
        self.inner
            .tasks
            .run(async move {
                let mut state = this.inner.state.write();
                let songs = state.songs.make_contiguous();
                if songs.len() > 2 {
                    songs[1..].shuffle(&mut rand::thread_rng());
                }
                info!(
                    "🔀 Cola mezclada en guild {} ({} canciones)",
                    this.inner.guild_id,
                    songs.len()
                );
                Ok(())
            })
            .await
    }

    /// Salta a una posición: positiva 1-based sobre la cola, negativa
    /// 1-based hacia atrás sobre el historial.
    pub async fn jump(&self, position: isize) -> Result<Song, PlayerError> {
        let this = self.clone();
        self.inner
            .tasks
            .run(async move {
                let target = {
                    let mut state = this.inner.state.write();

                    if position == 0 {
                        return Err(PlayerError::InvalidSong);
                    }

                    if position > 0 {
                        let n = position as usize;
                        if n > state.songs.len() {
                            return Err(PlayerError::InvalidSong);
                        }
                        if n == 1 {
                            // Re-afirmar la cabeza: vuelve a sonar desde cero
                            state.pending = Pending::Replay;
                            state.songs.front().cloned().ok_or(PlayerError::InvalidSong)?
                        } else {
                            // Las salteadas se descartan, no van al historial
                            state.songs.drain(1..n - 1);
                            state.pending = Pending::Skip;
                            state.songs.get(1).cloned().ok_or(PlayerError::InvalidSong)?
                        }
                    } else {
                        if !this.inner.config.save_previous_songs {
                            return Err(PlayerError::InvalidSong);
                        }
                        if state.previous.is_empty() {
                            return Err(PlayerError::NoPreviousSong);
                        }
                        let back = position.unsigned_abs();
                        if back > state.previous.len() {
                            return Err(PlayerError::InvalidSong);
                        }
                        let split_at = state.previous.len() - back;
                        let slice = state.previous.split_off(split_at);
                        let target = slice[0].clone();
                        state.pending = Pending::Back(slice);
                        target
                    }
                };

                info!("↪️ Saltando a {} en guild {}", target.name, this.inner.guild_id);
                this.stop_current_track();
                Ok(target)
            })
            .await
    }

    /// Sin argumento cicla Off → Track → Queue; repetir el modo actual
    /// lo apaga.
    pub async fn set_repeat_mode(&self, mode: Option<LoopMode>) -> Result<LoopMode, PlayerError> {
        let this = self.clone();
        self.inner
            .tasks
            .run(async move {
                let mut state = this.inner.state.write();
                let new_mode = match mode {
                    None => state.repeat.cycled(),
                    Some(m) if m == state.repeat => LoopMode::Off,
                    Some(m) => m,
                };
                state.repeat = new_mode;
                info!(
                    "🔁 Modo de repetición {:?} en guild {}",
                    new_mode, this.inner.guild_id
                );
                Ok(new_mode)
            })
            .await
    }

    /// Activa o desactiva un filtro (`None` limpia todos) y reinicia el
    /// stream desde la posición actual para que la cadena nueva aplique.
    pub async fn set_filter(
        &self,
        filter: Option<AudioFilter>,
    ) -> Result<Vec<AudioFilter>, PlayerError> {
        let this = self.clone();
        self.inner
            .tasks
            .run(async move {
                // Capturar la posición antes de pisar el stream
                let position = this.current_time().await;

                let filters = {
                    let mut state = this.inner.state.write();
                    match filter {
                        None => state.filters.clear(),
                        Some(f) => {
                            if let Some(idx) = state.filters.iter().position(|x| *x == f) {
                                state.filters.remove(idx);
                            } else {
                                state.filters.push(f);
                            }
                        }
                    }
                    state.begin_time = position;
                    state.filters.clone()
                };

                info!(
                    "🎛️ Filtros activos en guild {}: [{}]",
                    this.inner.guild_id,
                    AudioFilter::chain(&filters)
                );

                this.restart_stream().await?;
                Ok(filters)
            })
            .await
    }

    /// Reposiciona la reproducción de la canción actual.
    pub async fn seek(&self, time: Duration) -> Result<(), PlayerError> {
        let this = self.clone();
        self.inner
            .tasks
            .run(async move {
                {
                    let mut state = this.inner.state.write();
                    let head = state.songs.front().ok_or(PlayerError::NoPlayingSong)?;
                    if head.is_live {
                        return Err(PlayerError::InvalidInput(
                            "no se puede reposicionar una transmisión en vivo".to_string(),
                        ));
                    }
                    state.begin_time = time;
                }

                info!(
                    "⏩ Seek a {:?} en guild {}",
                    time, this.inner.guild_id
                );
                this.restart_stream().await?;
                Ok(())
            })
            .await
    }

    /// Resuelve y encola la primera canción relacionada que no esté en
    /// el historial.
    pub async fn add_related_song(&self) -> Result<Song, PlayerError> {
        let this = self.clone();
        self.inner
            .tasks
            .run(async move { this.append_related().await })
            .await
    }

    /// Quita una canción de la cola por posición (0 es la actual y no
    /// se puede quitar).
    pub async fn remove(&self, position: usize) -> Result<Song, PlayerError> {
        if position == 0 {
            return Err(PlayerError::InvalidInput(
                "no se puede quitar la canción en reproducción".to_string(),
            ));
        }

        let this = self.clone();
        self.inner
            .tasks
            .run(async move {
                let mut state = this.inner.state.write();
                if position >= state.songs.len() {
                    return Err(PlayerError::InvalidSong);
                }
                let song = state.songs.remove(position).ok_or(PlayerError::InvalidSong)?;
                info!(
                    "🗑️ {} quitada de la cola de guild {}",
                    song.name, this.inner.guild_id
                );
                Ok(song)
            })
            .await
    }

    /// Cambia el flag de autoplay. Un flip puro: no pasa por el
    /// serializador.
    pub fn toggle_autoplay(&self) -> bool {
        let mut state = self.inner.state.write();
        state.autoplay = !state.autoplay;
        info!(
            "🎲 Autoplay {} en guild {}",
            if state.autoplay { "activado" } else { "desactivado" },
            self.inner.guild_id
        );
        state.autoplay
    }

    // ---- Getters (no serializados) ----

    pub fn guild_id(&self) -> GuildId {
        self.inner.guild_id
    }

    pub fn text_channel(&self) -> Option<ChannelId> {
        self.inner.text_channel
    }

    pub fn voice_target(&self) -> VoiceTarget {
        self.inner.voice_target
    }

    pub fn songs(&self) -> Vec<Song> {
        self.inner.state.read().songs.iter().cloned().collect()
    }

    pub fn previous_songs(&self) -> Vec<Song> {
        self.inner.state.read().previous.clone()
    }

    pub fn current_song(&self) -> Option<Song> {
        self.inner.state.read().songs.front().cloned()
    }

    pub fn is_playing(&self) -> bool {
        self.inner.state.read().playing
    }

    pub fn is_paused(&self) -> bool {
        self.inner.state.read().paused
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.state.read().stopped
    }

    pub fn repeat_mode(&self) -> LoopMode {
        self.inner.state.read().repeat
    }

    pub fn autoplay(&self) -> bool {
        self.inner.state.read().autoplay
    }

    pub fn volume(&self) -> f32 {
        self.inner.state.read().volume
    }

    pub fn filters(&self) -> Vec<AudioFilter> {
        self.inner.state.read().filters.clone()
    }

    /// Duración total de lo que queda en la cola.
    pub fn duration(&self) -> Duration {
        self.inner
            .state
            .read()
            .songs
            .iter()
            .map(|s| s.duration)
            .sum()
    }

    /// Posición de reproducción dentro de la canción actual.
    pub async fn current_time(&self) -> Duration {
        let begin = self.inner.state.read().begin_time;
        match self.current_resource() {
            Some(resource) => begin + resource.position().await,
            None => begin,
        }
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.inner.state.read();
        QueueSnapshot {
            current: state.songs.front().cloned(),
            upcoming: state.songs.iter().skip(1).cloned().collect(),
            total_items: state.songs.len(),
            repeat: state.repeat,
            autoplay: state.autoplay,
            total_duration: state.songs.iter().map(|s| s.duration).sum(),
        }
    }

    // ---- Soporte interno para el manager y el driver ----

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.state.read().songs.is_empty()
    }

    pub(crate) fn tasks(&self) -> &TaskQueue {
        &self.inner.tasks
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub(crate) fn emit(&self, event: PlayerEvent) {
        let _ = self.inner.events.send(event);
    }

    pub(crate) fn advance_state(&self) -> Advanced {
        self.inner.state.write().advance(&self.inner.config)
    }

    /// Descarta una cabeza que no se pudo reproducir. Devuelve cuántas
    /// canciones quedan.
    pub(crate) fn pop_broken_head(&self) -> usize {
        let mut state = self.inner.state.write();
        state.songs.pop_front();
        state.songs.len()
    }

    fn current_resource(&self) -> Option<Arc<dyn AudioResource>> {
        self.inner.resource.lock().clone()
    }

    pub(crate) fn take_resource(&self) -> Option<Arc<dyn AudioResource>> {
        self.inner.resource.lock().take()
    }

    fn stop_current_track(&self) {
        if let Some(resource) = self.current_resource() {
            let _ = resource.stop();
        }
    }

    /// Consume un fin de track absorbible. Verdadero si este fin
    /// proviene de un reinicio de stream y no debe avanzar la cola.
    pub(crate) fn consume_swallowed_finish(&self) -> bool {
        self.inner
            .swallowed_finishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
            .is_ok()
    }

    /// Arranca (o reinicia) el streaming de la cabeza actual.
    pub(crate) async fn start_playback(&self) -> Result<Song, PlayerError> {
        let (song, begin_time, filters, volume) = {
            let state = self.inner.state.read();
            let song = state.songs.front().cloned().ok_or(PlayerError::NoPlayingSong)?;
            (song, state.begin_time, state.filters.clone(), state.volume)
        };

        let stream: MediaStream = self
            .inner
            .pipeline
            .open(&song, begin_time, &filters)
            .await
            .map_err(PlayerError::Pipeline)?;

        // El open pudo suspender un buen rato: revalidar que la sesión siga viva
        if self.inner.state.read().stopped {
            return Err(PlayerError::Terminated);
        }

        // Si hay un track vivo es porque esto es un reinicio: su evento
        // de fin no debe disparar el avance
        {
            let mut slot = self.inner.resource.lock();
            if slot.take().is_some() {
                self.inner.swallowed_finishes.fetch_add(1, Ordering::SeqCst);
            }
        }

        let resource = self
            .inner
            .voice
            .play(stream, PlayOptions { gain: volume / 100.0 })
            .await
            .map_err(PlayerError::Transport)?;

        *self.inner.resource.lock() = Some(resource);
        {
            let mut state = self.inner.state.write();
            state.playing = true;
            state.paused = false;
        }

        debug!("▶️ Streaming iniciado: {}", song.name);
        Ok(song)
    }

    /// Reinicia el stream de la cabeza, si hay algo que reiniciar.
    async fn restart_stream(&self) -> Result<(), PlayerError> {
        {
            let state = self.inner.state.read();
            if state.songs.front().is_none() || state.stopped {
                return Ok(());
            }
        }
        let song = self.start_playback().await?;
        debug!("🔄 Stream reiniciado: {}", song.name);
        Ok(())
    }

    /// Busca la primera relacionada que no esté en el historial, la
    /// resuelve y la encola.
    pub(crate) async fn append_related(&self) -> Result<Song, PlayerError> {
        let (reference, played) = {
            let state = self.inner.state.read();
            let reference = state
                .songs
                .front()
                .cloned()
                .or_else(|| state.previous.last().cloned())
                .ok_or(PlayerError::NoPlayingSong)?;
            let played: HashSet<String> =
                state.previous.iter().map(|s| s.id.clone()).collect();
            (reference, played)
        };

        let candidate = reference
            .related
            .iter()
            .find(|r| !played.contains(&r.id))
            .cloned()
            .ok_or(PlayerError::NoRelatedSong)?;

        debug!("🎲 Resolviendo relacionada: {}", candidate.name);

        let mut song = self
            .inner
            .resolver
            .resolve(&reference.requester, &candidate.url)
            .await
            .map_err(PlayerError::Resolve)?;
        song.strip_metadata();

        self.inner.state.write().songs.push_back(song.clone());
        info!(
            "🎲 Relacionada encolada en guild {}: {}",
            self.inner.guild_id, song.name
        );
        Ok(song)
    }

    /// Desmonta la sesión: marca el estado terminal, corta el stream,
    /// opcionalmente abandona la voz y se quita del mapa de sesiones.
    /// Idempotente.
    pub(crate) async fn terminate(&self, leave_voice: bool) {
        let first = {
            let mut state = self.inner.state.write();
            if state.stopped {
                false
            } else {
                state.stopped = true;
                state.playing = false;
                state.paused = false;
                true
            }
        };
        if !first {
            return;
        }

        if let Some(resource) = self.take_resource() {
            let _ = resource.stop();
        }

        if leave_voice {
            if let Err(e) = self.inner.voice.disconnect().await {
                warn!(
                    "no se pudo abandonar la voz en guild {}: {}",
                    self.inner.guild_id, e
                );
            }
        }

        self.inner.sessions.remove(&self.inner.guild_id);
        self.inner.shutdown.cancel();
    }
}
