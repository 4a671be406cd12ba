use clap::Parser;
use tracing_subscriber::EnvFilter;
use wealthtrack::cli::{load_store, report, Args};

fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log_level))
        .with_writer(std::io::stderr)
        .init();

    let store = load_store(args.command.input())?;
    report(&args.command, &store, std::io::stdout().lock())?;
    Ok(())
}
