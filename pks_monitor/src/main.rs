use std::error;

use clap::Parser;
use color_eyre::eyre::WrapErr;
use pks_monitor::{client, server, ApiMetrics, ApiProber, Monitor, MonitorConfig};
use pks_monitor_reqwest::BearerAuthMiddleware;
use pks_monitor_tokens::{dto, TokenAuthority, TokenStore};
use reqwest_middleware::ClientBuilder;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let config = MonitorConfig::parse();

    let http_client =
        client::build_http_client(&config).wrap_err("could not create the API HTTP client")?;

    let mut authority = TokenAuthority::new(
        http_client.clone(),
        config.token_url()?,
        dto::ClientCredentials {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        },
    );
    if config.auth_preflight {
        authority = authority.with_preflight(config.preflight_url()?);
    }

    let token_store = TokenStore::empty();
    let metrics = ApiMetrics::new();

    // An initial grant failure is not fatal: the monitor starts without a
    // token, reports the API down, and heals through the re-auth path once
    // the authority comes back.
    match authority.request_token().await {
        Ok(credential) => token_store.set(credential),
        Err(error) => {
            metrics.set_api_up(false);
            tracing::warn!(
                error = (&error as &dyn error::Error),
                "initial authentication failed, continuing without a token"
            );
        }
    }

    let api_client = ClientBuilder::new(http_client)
        .with(BearerAuthMiddleware::new(token_store.clone()))
        .build();
    let prober = ApiProber::new(
        api_client,
        config.clusters_url()?,
        authority,
        token_store,
        metrics.clone(),
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let monitor = Monitor::new(prober, config.interval, shutdown.clone());
    let monitor_task = tokio::spawn(monitor.run());

    let served = server::serve(config.listen_addr, metrics, shutdown.clone()).await;

    // However the server ended, make sure the monitor winds down too.
    shutdown.cancel();
    monitor_task.await?;
    served.wrap_err("http server stopped unexpectedly")?;

    Ok(())
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => terminate,
            Err(error) => {
                tracing::error!(
                    error = (&error as &dyn error::Error),
                    "could not register the terminate signal handler"
                );
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("received interrupt signal, stopping"),
            _ = terminate.recv() => tracing::info!("received terminate signal, stopping"),
        }
    }

    #[cfg(not(unix))]
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("received interrupt signal, stopping");
    }

    shutdown.cancel();
}
