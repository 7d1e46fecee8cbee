use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Installs the process-wide subscriber. `WORKBENCH_LOG` wins over `RUST_LOG`.
pub fn init_tracing(component: &str) {
    let default_filter = format!("info,iq_workbench=debug,{component}=debug");

    let filter = std::env::var("WORKBENCH_LOG")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .compact()
        .try_init();
}

/// Client flavour: logs go to stderr and default to warnings so they do not
/// interleave with the transcript on stdout.
pub fn init_client_tracing() {
    let filter = std::env::var("WORKBENCH_LOG")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
