use anyhow::{bail, Result};
use clap::Parser;
use indicator_ledger::cli::{Cli, Command};
use indicator_ledger::service;

#[tokio::main]
async fn main() -> Result<()> {
    let (command, args) = Cli::parse().into_parts();
    match command {
        Command::Probe => {
            let down = service::probe_all(&args.families(command)).await?;
            if !down.is_empty() {
                bail!("providers unavailable for: {}", down.join(", "));
            }
            Ok(())
        }
        Command::Run | Command::Indices | Command::Currencies => {
            service::run_with_config(args.service_config(command)?).await
        }
    }
}
