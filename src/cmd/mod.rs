//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`run`] or [`health`]. Each handler lives in its
//! own submodule.

pub mod health;
pub mod run;

use crate::cli::{Cli, Commands};
use crate::error::TeeProxyError;

pub async fn dispatch(cli: Cli) -> Result<(), TeeProxyError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
        Some(Commands::Health(args)) => health::execute(args).await,
        None => {
            print_welcome();
            Ok(())
        }
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "\n  teeproxy v{version} \u{2014} transparent reverse proxy with traffic capture\n\n  \
         No command provided. To get started:\n\n    \
         teeproxy run --target-url http://localhost:8080    Proxy :3000 to :8080\n    \
         TARGET_URL=http://backend teeproxy run              Configure from the environment\n    \
         teeproxy health http://localhost:3000/_health      Probe a running instance\n    \
         teeproxy --help                                    See all commands and options\n"
    );
}
