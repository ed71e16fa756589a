use clap::Parser;

use passage_cli::{Cli, run};
use passage_infra::{AppConfig, AuthStack};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    passage_observability::init();

    let config = AppConfig::from_env()?;
    let stack = AuthStack::connect(&config).await?;

    let output = run(&stack, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
