use credibility_scan::{api::routes::create_router, config::Config, logging, AppState};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;
    logging::init_logging(&config.log_level, config.log_format);

    let server_addr = config.server_addr;
    info!(
        environment = ?config.environment,
        classifier = %config.classifier_url,
        timeout = ?config.request_timeout,
        "Starting server on {}",
        server_addr
    );

    // One coordinator for the lifetime of the process
    let app_state = AppState::new(config)?;

    let app = create_router(app_state);
    let listener = TcpListener::bind(server_addr).await?;

    info!("Listening on {}", server_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
