use super::env::CliArgs;
use super::info::cmd_info;
use super::inspect::cmd_inspect;
use super::record::cmd_record;
use super::serve::cmd_serve;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Serve(args) => cmd_serve(args, ctx).await,
        Commands::Record(args) => cmd_record(args, ctx).await,
        Commands::Inspect(args) => cmd_inspect(args, ctx).await,
        Commands::Info => cmd_info(ctx).await,
    }
}
