use anyhow::Result;

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::app::run().await
}
