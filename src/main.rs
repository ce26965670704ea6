use std::process::ExitCode;

use clap::Parser;
use texseven::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let command = Cli::parse().command.unwrap_or(Command::Lsp);
    if command == Command::Lsp {
        tracing::info!("starting texseven language server");
        texseven::server::run().await;
        return ExitCode::SUCCESS;
    }

    match tokio::task::spawn_blocking(move || cli::run(command)).await {
        Ok(Ok(out)) => {
            print!("{out}");
            ExitCode::SUCCESS
        }
        Ok(Err(err)) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
        Err(err) => {
            tracing::error!("command task failed: {err}");
            ExitCode::FAILURE
        }
    }
}
