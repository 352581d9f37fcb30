use std::path::PathBuf;

use clap::Parser;
use portal::{Application, PortalConfig, ShellError};

#[derive(Parser, Debug)]
#[command(name = "portal", about = "Diagnosis portal client shell")]
struct Args {
    /// TOML config file; `PORTAL_*` variables override it.
    #[arg(long, env = "PORTAL_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), ShellError> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let config = PortalConfig::load(args.config.as_deref())?;
    portal::logging::init(&config.logging);

    let mut app = Application::boot(config)?;
    let resolution = app.mount()?;
    tracing::info!(route = resolution.path().unwrap_or("-"), "portal running; ctrl-c to exit");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
    }
    app.shutdown().await;
    Ok(())
}
