use anyhow::Result;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Log to stderr so stdout stays clean for command output.
/// `RUST_LOG` overrides the default `info` level.
pub fn init_logging() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set up logging: {e}"))?;

    Ok(())
}
