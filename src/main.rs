use clap::Parser;
use pmp_rag_engine::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, engine) = cli::build_engine().await?;

    let success = match &cli.command {
        Command::Serve => {
            cli::serve::run(&config, engine).await?;
            return Ok(());
        }
        Command::Ingest(args) => cli::retrieval::ingest(&engine, args).await?,
        Command::Query(args) => cli::retrieval::query(&engine, args).await?,
        command => cli::admin::run(&engine, command).await?,
    };

    engine.shutdown().await?;

    if !success {
        std::process::exit(1);
    }

    Ok(())
}
