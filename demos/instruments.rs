use anyhow::Result;
use clap::Parser;
use investapi_client::runner::{self, RunnerArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let args = RunnerArgs::parse();

    // Startup errors (config, logger, connection) end the process with a
    // non-zero status; query errors are logged inside the run.
    runner::run(&args).await?;
    Ok(())
}
