use anyhow::Result;
use clap::{Parser, Subcommand};

use netmedic::report::{FileReporter, Reporter};
use netmedic::{Runner, Settings};

#[derive(Parser)]
#[command(
    name = "netmedic",
    about = "Asynchronous network-measurement core",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a TCP reachability test against host:port
    TcpConnect {
        /// Target host (defaults to localhost)
        #[arg(long)]
        host: Option<String>,

        /// Target port
        #[arg(long)]
        port: u16,

        /// Connect timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: f64,

        /// Address family: unspec, v4 or v6
        #[arg(long, default_value = "unspec")]
        family: String,

        /// Append the measurement record to this JSONL report file
        #[arg(long)]
        report: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::TcpConnect {
            host,
            port,
            timeout,
            family,
            report,
        } => {
            let mut settings = Settings::new();
            settings.set("port", port);
            settings.set("net/timeout", timeout);
            settings.set("net/address_family", family);
            if let Some(host) = host {
                settings.set("host", host);
            }

            tracing::info!(%port, "Running tcp_connect");
            let record =
                tokio::task::spawn_blocking(move || netmedic::run_tcp_connect(settings)).await??;

            println!("{}", serde_json::to_string_pretty(&record)?);

            if let Some(path) = report {
                let mut reporter = FileReporter::new(path);
                reporter.open().await?;
                reporter.write_entry(&record).await?;
                reporter.close().await?;
            }

            // controlled teardown of the global runner
            tokio::task::spawn_blocking(|| Runner::global().join_()).await?;
        }
    }

    Ok(())
}
