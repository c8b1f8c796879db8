use tracing_subscriber::EnvFilter;

fn main() {
    // stdout carries the JSON response, logs go to stderr
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mediagrab=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    std::process::exit(mediagrab::cli::run());
}
