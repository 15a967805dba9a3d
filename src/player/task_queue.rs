use futures::future::BoxFuture;
use std::future::Future;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::PlayerError;

/// Serializador de trabajo de una sesión.
///
/// Un único worker drena las unidades en orden FIFO y espera la
/// terminación (éxito o fallo) de cada una antes de arrancar la
/// siguiente, incluso a través de puntos de suspensión. El fallo de una
/// unidad se reporta solo a quien la encoló; la siguiente corre igual.
pub struct TaskQueue {
    tx: flume::Sender<BoxFuture<'static, ()>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded::<BoxFuture<'static, ()>>();

        tokio::spawn(async move {
            while let Ok(unit) = rx.recv_async().await {
                // Una unidad arrancada corre hasta el final, sin cancelación
                unit.await;
            }
            debug!("🧵 Worker de tareas terminado");
        });

        Self { tx }
    }

    /// Encola una unidad de trabajo y espera su resultado.
    ///
    /// Si no hay ninguna unidad en vuelo, la recién encolada arranca de
    /// inmediato.
    pub async fn run<T, F>(&self, unit: F) -> Result<T, PlayerError>
    where
        F: Future<Output = Result<T, PlayerError>> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();

        let wrapped: BoxFuture<'static, ()> = Box::pin(async move {
            let result = unit.await;
            // El llamador pudo haberse desinteresado; no es un error
            let _ = done_tx.send(result);
        });

        self.tx.send(wrapped).map_err(|_| PlayerError::Terminated)?;

        done_rx.await.map_err(|_| PlayerError::Terminated)?
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
