use amortize::api::{Cli, Command, run_http_server, run_schedule};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            port,
            history_capacity,
        } => {
            if let Err(e) = run_http_server(port, history_capacity).await {
                tracing::error!("Server error: {e}");
                std::process::exit(1);
            }
        }
        Command::Schedule(args) => match run_schedule(&args) {
            Ok(output) => print!("{output}"),
            Err(msg) => {
                eprintln!("{msg}");
                std::process::exit(1);
            }
        },
    }
}

// Logs go to stderr so `schedule` output stays pipeable.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
