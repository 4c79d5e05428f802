use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the configured level;
/// each `-v` raises the configured level one step.
pub fn init(level: &str, verbose: u8) -> miette::Result<()> {
    let level = match verbose {
        0 => level,
        1 => "debug",
        _ => "trace",
    };
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives),
        _ => EnvFilter::try_new(level),
    }
    .map_err(|err| miette::miette!("invalid log filter: {err}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| miette::miette!("could not install logger: {err}"))
}
