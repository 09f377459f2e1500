use anyhow::Context as _;
use tracing_subscriber::EnvFilter;

/// Used when `RUST_LOG` is unset or unparsable. Request spans from
/// `TraceLayer` are logged at debug, so they stay quiet by default.
const DEFAULT_DIRECTIVES: &str = "info,tower_http=info";

fn filter_from(raw: Option<&str>) -> anyhow::Result<EnvFilter> {
    raw.and_then(|directives| EnvFilter::try_new(directives).ok())
        .map_or_else(|| EnvFilter::try_new(DEFAULT_DIRECTIVES), Ok)
        .context("build log filter")
}

/// Installs the stderr subscriber. Both binaries call this once at startup.
pub fn init() -> anyhow::Result<()> {
    let raw = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = filter_from(raw.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}
