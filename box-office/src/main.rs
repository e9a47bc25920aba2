use box_office::{BoxOffice, setup_environment, triggers};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment (dotenv, config, logging)
    let config = setup_environment();
    tracing::info!(environment = %config.environment, "Box office starting...");

    // 2. Storage, gateway client, deferred worker
    let office = BoxOffice::initialize(&config)?;

    // 3. Triggers from stdin until EOF or Ctrl-C
    {
        let token = CancellationToken::new();
        let listener = triggers::listen(
            office.manager(),
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            config.webhook_secret.as_deref(),
            token.clone(),
        );
        tokio::pin!(listener);

        let result = tokio::select! {
            result = &mut listener => result,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                token.cancel();
                listener.await
            }
        };
        if let Err(e) = result {
            tracing::error!(error = %e, "Trigger listener failed");
        }
    }

    // 4. Let in-flight deferred jobs wind down
    let stopped = office.stopped_tasks();
    if !stopped.is_empty() {
        tracing::warn!(?stopped, "Some background tasks ended early");
    }
    office.shutdown().await;
    Ok(())
}
