mod main_lib;

use main_lib::{build_context, init_tracing, log_summary};
use marketsync_core::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::load()?;
    let context = build_context(&config)?;

    let handles = context.jobs.start();
    tracing::info!("Started {} job loop(s), press Ctrl-C to stop", handles.len());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    for handle in &handles {
        handle.abort();
    }
    log_summary(&context);
    Ok(())
}
