use tracing_subscriber::EnvFilter;

use skirmish_server::config::ServerConfig;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("Skirmish server starting");

    let config = ServerConfig::load();
    config.validate();

    if let Err(e) = skirmish_server::run_server(config).await {
        tracing::error!(error = %e, "server terminated");
        std::process::exit(1);
    }
}
