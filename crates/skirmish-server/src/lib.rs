pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod room;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

use config::ServerConfig;
use connection::Connection;
use dispatcher::{WorkerPool, pool_size};
use registry::Registry;

/// Bind the configured address and serve forever.
pub async fn run_server(config: ServerConfig) -> std::io::Result<()> {
    let listener = TcpListener::bind(&config.listen_addr).await?;
    serve(listener, config).await
}

/// Accept loop over an already-bound listener. Spawns the dispatcher pool,
/// then hands each accepted socket to the registry for session bootstrap.
pub async fn serve(listener: TcpListener, config: ServerConfig) -> std::io::Result<()> {
    let workers = pool_size(config.limits.workers);
    let registry = Arc::new(Registry::new(config));

    let (events, receiver) = mpsc::unbounded_channel();
    let _pool = WorkerPool::spawn(workers, Arc::clone(&registry), events.clone(), receiver);

    info!(addr = %listener.local_addr()?, workers, "skirmish listening");

    loop {
        let (stream, addr) = listener.accept().await?;
        let conn = Connection::spawn(stream, addr, events.clone());
        info!(conn = conn.id, %addr, "client connected");

        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            if let Err(e) = registry.bootstrap(Arc::clone(&conn)).await {
                warn!(conn = conn.id, error = %e, "session bootstrap failed");
                registry.handle_disconnect(conn.id).await;
            }
        });
    }
}
