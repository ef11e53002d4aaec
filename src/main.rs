use clap::Parser;
use tracing_subscriber::EnvFilter;

use childwarden::cli::{self, Cli};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let exit_code = cli::run(Cli::parse());
    std::process::exit(exit_code);
}
