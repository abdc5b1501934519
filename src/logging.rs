use tracing_subscriber::EnvFilter;

fn default_directive(verbose: bool, quiet: bool) -> &'static str {
    if verbose {
        "racf_chatbot=debug,warn"
    } else if quiet {
        "warn"
    } else {
        "racf_chatbot=info,warn"
    }
}

/// Diagnostics go to stderr so they never interleave with the conversation on stdout.
/// `RUST_LOG` wins over the command-line flags when set.
pub fn init(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .with_target(false)
        .try_init();
}
