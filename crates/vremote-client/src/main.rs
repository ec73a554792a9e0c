//! vremote binary entry point.

use clap::Parser;
use tracing::{error, info};

use vremote_client::{Cli, RemoteDriver, execute};

fn main() {
    let cli = Cli::parse();

    let log_format = cli.log_format.into();
    if let Err(e) = vremote_core::init_logging(cli.verbose, cli.log_file.as_deref(), log_format) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "vremote starting");

    let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");

    match rt.block_on(run(&cli)) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("vremote: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: &Cli) -> vremote_core::Result<String> {
    let driver = RemoteDriver::new(cli.tls_paths());

    let Some(mut conn) = driver.open(Some(&cli.connect), cli.open_flags()).await? else {
        return Err(vremote_core::Error::Config {
            message: format!("URI '{}' is not handled by the remote driver", cli.connect),
        });
    };

    let result = execute(&mut conn, &cli.command, cli.json).await;
    let closed = conn.close().await;

    let output = result?;
    closed?;
    Ok(output)
}
