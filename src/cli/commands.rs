use clap::Subcommand;

use super::inspect::InspectArgs;
use super::record::RecordArgs;
use super::serve::ServeArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Attach to the browser and host the control surface until Ctrl-C
    Serve(ServeArgs),

    /// Record the active tab until Ctrl-C and export the flows
    Record(RecordArgs),

    /// Summarize and filter an exported flow file
    Inspect(InspectArgs),

    /// Show version and build information
    Info,
}
