//! meshexit: point a mesh peer's default route at a chosen exit node.
//!
//! Initializes the global allocator, sets up logging, parses the command
//! line and dispatches to the command implementations. Everything with
//! actual behavior lives in meshexit-core.

mod commands;
mod credentials;
mod render;

use clap::Parser;
use commands::Commands;
use tracing_subscriber::EnvFilter;

// Use mimalloc as the global allocator for reduced memory fragmentation
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Debug, Parser)]
#[command(
    name = "meshexit",
    version,
    about = "Manage which exit node a mesh peer routes its traffic through"
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .compact()
        .init();

    if let Err(err) = cli.command.execute().await {
        render::report_error(&err);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_flag_is_global() {
        let cli = Cli::parse_from(["meshexit", "exit-nodes", "list", "--verbose"]);
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_requires_a_command() {
        assert!(Cli::try_parse_from(["meshexit"]).is_err());
    }
}
