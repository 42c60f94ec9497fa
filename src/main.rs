use std::path::Path;

use clap::Parser;

#[tokio::main]
async fn main() {
    teeproxy::cli::load_env_file(Path::new(".env"));
    let cli = teeproxy::cli::Cli::parse();
    if let Err(e) = teeproxy::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
