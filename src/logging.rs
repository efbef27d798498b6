use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber
///
/// `RUST_LOG` wins over `default_level`; `verbose` forces debug output.
/// Records emitted through the `log` facade are captured as well.
pub fn setup_logger(default_level: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    let result = tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .compact()
        .with_env_filter(filter)
        .try_init();

    if let Err(e) = result {
        eprintln!("Logger already initialised: {}", e);
    }
}
