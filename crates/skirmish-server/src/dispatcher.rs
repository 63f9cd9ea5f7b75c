//! Fixed pool of worker tasks draining one shared I/O event queue.
//!
//! Every connection's reads and send completions funnel into a single
//! unbounded channel. Workers pull from it through a shared async mutex,
//! so each event is handled exactly once by whichever worker gets there
//! first. A `Shutdown` sentinel terminates exactly one worker; the pool
//! posts one per worker for a graceful stop.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::connection::ConnectionId;
use crate::registry::Registry;

#[derive(Debug)]
pub enum IoEvent {
    /// A read completed. Empty `data` means the peer is gone.
    Received { conn: ConnectionId, data: Bytes },
    /// A frame was fully written; the connection's send gate may reopen.
    Sent { conn: ConnectionId },
    Shutdown,
}

pub type EventSender = mpsc::UnboundedSender<IoEvent>;

/// Pool size from config; 0 means `2 * cpus + 2`.
pub fn pool_size(configured: usize) -> usize {
    if configured != 0 {
        return configured;
    }
    let cpus = std::thread::available_parallelism().map_or(1, usize::from);
    2 * cpus + 2
}

pub struct WorkerPool {
    events: EventSender,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(
        workers: usize,
        registry: Arc<Registry>,
        events: EventSender,
        receiver: mpsc::UnboundedReceiver<IoEvent>,
    ) -> Self {
        let receiver = Arc::new(Mutex::new(receiver));
        let handles = (0..workers)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&receiver),
                    Arc::clone(&registry),
                ))
            })
            .collect();
        Self { events, handles }
    }

    /// Post one shutdown sentinel per worker.
    pub fn shutdown(&self) {
        for _ in &self.handles {
            let _ = self.events.send(IoEvent::Shutdown);
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<IoEvent>>>,
    registry: Arc<Registry>,
) {
    debug!(worker_id, "dispatcher worker started");
    loop {
        let event = {
            let mut rx = receiver.lock().await;
            rx.recv().await
        };
        match event {
            None | Some(IoEvent::Shutdown) => break,
            Some(IoEvent::Sent { conn }) => registry.complete_send(conn).await,
            Some(IoEvent::Received { conn, data }) => {
                if data.is_empty() {
                    registry.handle_disconnect(conn).await;
                } else if let Err(e) = registry.handle_receive(conn, data).await {
                    // One bad connection never takes the pool down.
                    warn!(conn, error = %e, "receive handling failed, dropping connection");
                    registry.handle_disconnect(conn).await;
                }
            },
        }
    }
    debug!(worker_id, "dispatcher worker stopped");
}
