use std::future::IntoFuture;
use std::net::SocketAddr;

use anyhow::Context;
use tokio::net::TcpListener;

use agrochain_api::app;
use agrochain_api::config::AppConfig;

async fn bind(service: &str, addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {service} service on {addr}"))?;
    tracing::info!(service, addr = %listener.local_addr()?, "listening");
    Ok(listener)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    agrochain_observability::init_with(&config.logging);

    let app::Platform {
        services,
        harvest: harvest_app,
        supply: supply_app,
        billing: billing_app,
    } = app::build_platform(&config).context("failed to start services")?;

    let harvest = bind("harvest", config.harvest_addr).await?;
    let supply = bind("supply", config.supply_addr).await?;
    let billing = bind("billing", config.billing_addr).await?;

    let servers = async {
        tokio::try_join!(
            axum::serve(harvest, harvest_app).into_future(),
            axum::serve(supply, supply_app).into_future(),
            axum::serve(billing, billing_app).into_future(),
        )
    };

    let outcome = tokio::select! {
        result = servers => result.context("server error").map(|_| ()),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
            Ok(())
        }
    };

    // Workers join std threads and may own blocking HTTP clients.
    tokio::task::spawn_blocking(move || {
        services.shutdown();
        drop(services);
    })
    .await
    .context("shutdown task failed")?;

    outcome
}
