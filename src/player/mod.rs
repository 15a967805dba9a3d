//! # Player Module
//!
//! El núcleo del reproductor: una sesión por guild, comandos
//! serializados y el avance de la cola dirigido por los eventos del
//! transporte.
//!
//! ### [`task_queue`] - Serializador por sesión
//! - FIFO estricto, a lo sumo una unidad en vuelo por sesión
//!
//! ### [`queue`] - Estado de la sesión
//! - Lista de reproducción, historial, flags y transición de avance
//!
//! ### [`PlayerManager`] - Dueño de las sesiones
//! - Mapa guild → sesión, creación/baja atómica
//! - Adaptador de eventos del transporte (fin, error, desconexión)
//! - Arranque del streaming con reintentos acotados

pub mod queue;
pub mod task_queue;

pub use queue::{LoopMode, Queue, QueuePage, QueueSnapshot};
pub use task_queue::TaskQueue;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::audio::AudioPipeline;
use crate::config::Config;
use crate::error::PlayerError;
use crate::events::PlayerEvent;
use crate::player::queue::QueueContext;
use crate::song::Song;
use crate::sources::SongResolver;
use crate::voice::{TransportEvent, VoiceTarget, VoiceTransport};

/// Desenlace de un intento de arranque de streaming.
enum StreamOutcome {
    /// La cabeza quedó sonando.
    Started(Song),
    /// No quedó nada para reproducir.
    Emptied,
    /// Se agotaron los reintentos sin lograr reproducir nada.
    GaveUp,
    /// La sesión murió en el medio.
    Dead,
}

/// Dueño de todas las sesiones de reproducción.
///
/// Crea y destruye colas por guild, escucha el ciclo de vida del
/// transporte y corre el avance de cada cola dentro de su serializador.
#[derive(Clone)]
pub struct PlayerManager {
    inner: Arc<ManagerCore>,
}

struct ManagerCore {
    sessions: Arc<DashMap<GuildId, Queue>>,
    transport: Arc<dyn VoiceTransport>,
    resolver: Arc<dyn SongResolver>,
    pipeline: Arc<dyn AudioPipeline>,
    config: Arc<Config>,
    events_tx: flume::Sender<PlayerEvent>,
    events_rx: flume::Receiver<PlayerEvent>,
}

impl PlayerManager {
    pub fn new(
        config: Config,
        transport: Arc<dyn VoiceTransport>,
        resolver: Arc<dyn SongResolver>,
        pipeline: Arc<dyn AudioPipeline>,
    ) -> Self {
        let (events_tx, events_rx) = flume::unbounded();
        debug!("🎛️ {}", config.summary());

        Self {
            inner: Arc::new(ManagerCore {
                sessions: Arc::new(DashMap::new()),
                transport,
                resolver,
                pipeline,
                config: Arc::new(config),
                events_tx,
                events_rx,
            }),
        }
    }

    /// Receiver de notificaciones del reproductor.
    pub fn events(&self) -> flume::Receiver<PlayerEvent> {
        self.inner.events_rx.clone()
    }

    pub fn has(&self, guild_id: GuildId) -> bool {
        self.inner.sessions.contains_key(&guild_id)
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Queue> {
        self.inner.sessions.get(&guild_id).map(|q| q.value().clone())
    }

    /// Quita la sesión del mapa y corta su loop de eventos. Idempotente.
    pub fn delete(&self, guild_id: GuildId) {
        if let Some((_, queue)) = self.inner.sessions.remove(&guild_id) {
            queue.shutdown_token().cancel();
            debug!("🗑️ Sesión de guild {} eliminada", guild_id);
        }
    }

    /// Crea la sesión del guild: se une a la voz, registra el ciclo de
    /// vida del transporte y encola la primera reproducción.
    pub async fn create(
        &self,
        target: VoiceTarget,
        songs: Vec<Song>,
        text_channel: Option<ChannelId>,
    ) -> Result<Queue, PlayerError> {
        if songs.is_empty() {
            return Err(PlayerError::InvalidInput(
                "se necesita al menos una canción inicial".to_string(),
            ));
        }
        if self.has(target.guild_id) {
            return Err(PlayerError::QueueExists(target.guild_id));
        }

        let connection = self
            .inner
            .transport
            .join(target)
            .await
            .map_err(PlayerError::Transport)?;
        let transport_events = connection.events();

        let queue = Queue::new(
            target,
            text_channel,
            songs,
            connection.clone(),
            QueueContext {
                sessions: self.inner.sessions.clone(),
                resolver: self.inner.resolver.clone(),
                pipeline: self.inner.pipeline.clone(),
                events: self.inner.events_tx.clone(),
                config: self.inner.config.clone(),
            },
        );

        // Inserción atómica: la sesión no es visible hasta estar completa,
        // y un create que pierde la carrera deshace su join
        let inserted = match self.inner.sessions.entry(target.guild_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(queue.clone());
                true
            }
        };
        if !inserted {
            let _ = connection.disconnect().await;
            return Err(PlayerError::QueueExists(target.guild_id));
        }

        self.spawn_lifecycle_loop(queue.clone(), transport_events);
        self.emit(PlayerEvent::InitQueue {
            queue: queue.clone(),
        });
        info!(
            "🆕 Sesión creada para guild {} con {} canción(es)",
            target.guild_id,
            queue.songs().len()
        );

        // Primera reproducción, serializada como cualquier otra mutación
        let manager = self.clone();
        let session = queue.clone();
        let empty = queue
            .tasks()
            .run(async move { Ok(manager.drive_playback(&session, false).await) })
            .await?;
        if empty {
            self.teardown_session(&queue, self.inner.config.leave_on_finish)
                .await;
        }

        Ok(queue)
    }

    /// Avanza la cola de la sesión y arranca lo que siga, como unidad
    /// serializada. Devuelve si la lista quedó sin reproducción posible.
    pub async fn play_song(&self, queue: &Queue) -> Result<bool, PlayerError> {
        let manager = self.clone();
        let session = queue.clone();
        queue
            .tasks()
            .run(async move { Ok(manager.advance_and_play(&session).await) })
            .await
    }

    fn emit(&self, event: PlayerEvent) {
        let _ = self.inner.events_tx.send(event);
    }

    /// Transición de fin de canción: consume la intención pendiente,
    /// decide la próxima cabeza y la pone a sonar.
    async fn advance_and_play(&self, queue: &Queue) -> bool {
        if queue.is_stopped() || !self.has(queue.guild_id()) {
            debug!(
                "avance ignorado: la sesión de guild {} ya terminó",
                queue.guild_id()
            );
            return true;
        }

        // El handle del track que terminó ya no sirve
        let _ = queue.take_resource();

        let advanced = queue.advance_state();
        if let Some(finished) = advanced.finished.clone() {
            self.emit(PlayerEvent::FinishSong {
                queue: queue.clone(),
                song: finished,
            });
        }

        // Lista vacía: autoplay puede rescatarla con una relacionada
        if queue.is_empty() {
            if queue.autoplay() {
                match queue.append_related().await {
                    Ok(song) => debug!("🎲 Autoplay encoló: {}", song.name),
                    Err(e) => {
                        warn!("🎲 Autoplay sin candidatas en guild {}: {}", queue.guild_id(), e);
                        self.emit(PlayerEvent::NoRelated {
                            queue: queue.clone(),
                        });
                    }
                }
            }
            if queue.is_empty() {
                self.emit(PlayerEvent::QueueFinish {
                    queue: queue.clone(),
                });
                return true;
            }
        }

        self.drive_playback(queue, advanced.replayed).await
    }

    /// Arranca la cabeza con reintentos y maneja los desenlaces
    /// terminales. Devuelve si la sesión quedó sin reproducción posible.
    async fn drive_playback(&self, queue: &Queue, replayed: bool) -> bool {
        match self.stream_with_retries(queue, replayed).await {
            StreamOutcome::Started(song) => {
                debug!("🎶 Sonando {} en guild {}", song.name, queue.guild_id());
                false
            }
            StreamOutcome::Emptied => {
                self.emit(PlayerEvent::QueueFinish {
                    queue: queue.clone(),
                });
                true
            }
            StreamOutcome::GaveUp => {
                self.emit(PlayerEvent::Error {
                    guild_id: queue.guild_id(),
                    channel: queue.text_channel(),
                    message: "ninguna canción de la cola se pudo reproducir".to_string(),
                });
                true
            }
            StreamOutcome::Dead => true,
        }
    }

    /// Intenta poner a sonar la cabeza; una cabeza rota se descarta y
    /// se prueba la siguiente, hasta el tope de reintentos.
    async fn stream_with_retries(&self, queue: &Queue, replayed: bool) -> StreamOutcome {
        let max_retries = self.inner.config.max_play_retries;

        for attempt in 1..=max_retries {
            if queue.is_stopped() || !self.has(queue.guild_id()) {
                return StreamOutcome::Dead;
            }
            if queue.is_empty() {
                return StreamOutcome::Emptied;
            }

            match queue.start_playback().await {
                Ok(song) => {
                    let suppress = replayed && self.inner.config.emit_new_song_only;
                    if !suppress {
                        self.emit(PlayerEvent::PlaySong {
                            queue: queue.clone(),
                            song: song.clone(),
                        });
                    }
                    return StreamOutcome::Started(song);
                }
                Err(PlayerError::Terminated) => return StreamOutcome::Dead,
                Err(e) => {
                    error!(
                        "❌ Fallo al reproducir en guild {} (intento {}/{}): {}",
                        queue.guild_id(),
                        attempt,
                        max_retries,
                        e
                    );
                    self.emit(PlayerEvent::Error {
                        guild_id: queue.guild_id(),
                        channel: queue.text_channel(),
                        message: e.to_string(),
                    });
                    if queue.pop_broken_head() == 0 {
                        return StreamOutcome::Emptied;
                    }
                }
            }
        }

        error!(
            "🚨 Sin canción reproducible tras {} intentos en guild {}",
            max_retries,
            queue.guild_id()
        );
        StreamOutcome::GaveUp
    }

    /// Desmonta una sesión como unidad serializada, respetando el orden
    /// frente a los comandos ya encolados.
    async fn teardown_session(&self, queue: &Queue, leave_voice: bool) {
        let session = queue.clone();
        let _ = queue
            .tasks()
            .run(async move {
                session.terminate(leave_voice).await;
                Ok::<_, PlayerError>(())
            })
            .await;
        info!("🏁 Sesión de guild {} finalizada", queue.guild_id());
    }

    /// Una tarea por sesión que traduce los eventos del transporte en
    /// mutaciones serializadas de la cola.
    fn spawn_lifecycle_loop(&self, queue: Queue, events: flume::Receiver<TransportEvent>) {
        let manager = self.clone();
        let shutdown = queue.shutdown_token();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv_async() => match event {
                        Ok(TransportEvent::Finished) => {
                            manager.handle_track_finish(queue.clone()).await;
                        }
                        Ok(TransportEvent::Error(message)) => {
                            manager.handle_transport_error(queue.clone(), message).await;
                        }
                        Ok(TransportEvent::Disconnected(reason)) => {
                            manager.handle_disconnect(queue.clone(), reason).await;
                            break;
                        }
                        Err(_) => break,
                    }
                }
            }
            debug!(
                "🔚 Loop de transporte terminado para guild {}",
                queue.guild_id()
            );
        });
    }

    async fn handle_track_finish(&self, queue: Queue) {
        // Un reinicio de stream (seek/filtros) detiene el track anterior:
        // ese fin no avanza la cola
        if queue.consume_swallowed_finish() {
            debug!("fin de track absorbido por reinicio de stream");
            return;
        }

        match self.play_song(&queue).await {
            Ok(true) => {
                self.teardown_session(&queue, self.inner.config.leave_on_finish)
                    .await;
            }
            Ok(false) => {}
            Err(e) => error!(
                "error en el avance de guild {}: {}",
                queue.guild_id(),
                e
            ),
        }
    }

    async fn handle_transport_error(&self, queue: Queue, message: String) {
        error!(
            "❌ Error de transporte en guild {}: {}",
            queue.guild_id(),
            message
        );
        self.teardown_session(&queue, self.inner.config.leave_on_stop)
            .await;
        self.emit(PlayerEvent::Error {
            guild_id: queue.guild_id(),
            channel: queue.text_channel(),
            message,
        });
    }

    async fn handle_disconnect(&self, queue: Queue, reason: Option<String>) {
        info!(
            "🔌 Transporte desconectado para guild {} ({:?})",
            queue.guild_id(),
            reason
        );
        // La conexión ya murió: desmontar sin intentar abandonarla
        self.teardown_session(&queue, false).await;
        self.emit(PlayerEvent::Disconnect {
            guild_id: queue.guild_id(),
            error: reason.clone(),
        });
        if let Some(message) = reason {
            self.emit(PlayerEvent::Error {
                guild_id: queue.guild_id(),
                channel: queue.text_channel(),
                message,
            });
        }
    }
}
