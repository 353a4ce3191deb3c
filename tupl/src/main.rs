use anyhow::Result;
use tupl::cli::{run, Cli};
use tupl_core::sites::SiteRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    // TUPL_HOME may come from a .env file.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt::init();
    tracing::info!("CLI application startup: tracing initialised, environment loaded");

    let registry = SiteRegistry::builtin()?;
    let cli = Cli::parse_with_sites(&registry);
    let result = run(cli).await;
    match &result {
        Ok(_) => tracing::info!("CLI completed successfully"),
        Err(e) => tracing::error!(error = %e, "CLI exited with error"),
    }
    result
}
