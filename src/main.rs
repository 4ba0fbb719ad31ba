use anyhow::Context;
use docsift::{api, config, logging, pipeline::PipelineService, staging::age_from_minutes};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::load().context("Failed to load config from environment")?;
    logging::init_tracing();
    tracing::debug!(
        staging_dir = %config.staging_dir.display(),
        output_path = %config.output_path.display(),
        server_port = ?config.server_port,
        structuring_provider = ?config.structuring_provider,
        "Loaded configuration"
    );

    let service = PipelineService::from_config(&config).context("Failed to build structurer")?;
    match service
        .staging()
        .sweep_stale(age_from_minutes(config.staging_sweep_minutes))
    {
        Ok(removed) => tracing::debug!(removed, "Startup staging sweep finished"),
        Err(error) => tracing::warn!(error = %error, "Startup staging sweep failed"),
    }
    if let Err(error) = service.sink().erase().await {
        tracing::warn!(error = %error, "Could not reset output file at startup");
    }

    let app = api::create_router(Arc::new(service), &config);

    let (listener, port) = bind_listener(config.server_port)
        .await
        .context("Failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

async fn bind_listener(preferred: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = preferred {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4200..=4299;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4200-4299",
    ))
}
