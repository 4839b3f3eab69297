use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use flowtap::{metrics, Mode};
use flowtap_flow_store::write_flow_file;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::context::{connect_controller, CliContext};
use crate::cli::output::OutputFormat;

pub const NETWORK_FLOW_FILE: &str = "network-flow.json";
pub const UI_FLOW_FILE: &str = "ui-flow.json";

#[derive(Args, Clone, Debug)]
pub struct RecordArgs {
    /// Record network exchanges
    #[arg(long)]
    pub network: bool,

    /// Record UI interactions
    #[arg(long)]
    pub ui: bool,

    /// Directory receiving the exported flows
    #[arg(short, long, default_value = "flowtap-out")]
    pub out_dir: PathBuf,

    /// Attach to an existing Chrome DevTools websocket
    #[arg(long)]
    pub ws_url: Option<String>,
}

impl RecordArgs {
    /// Requested modes; both when neither flag is given.
    fn modes(&self) -> Vec<Mode> {
        match (self.network, self.ui) {
            (true, false) => vec![Mode::Network],
            (false, true) => vec![Mode::Ui],
            _ => vec![Mode::Network, Mode::Ui],
        }
    }
}

pub async fn cmd_record(args: RecordArgs, ctx: &CliContext) -> Result<()> {
    let mut config = ctx.config().clone();
    if let Some(ws_url) = args.ws_url.clone() {
        config.cdp.ws_url = Some(ws_url);
    }
    let modes = args.modes();

    let _metrics_server = metrics::spawn_metrics_server(ctx.metrics_port());
    let controller = connect_controller(&config).await?;
    let cancel = CancellationToken::new();
    let mut pump = controller.spawn_event_pump(cancel.clone());

    for mode in &modes {
        if let Err(err) = controller.start(*mode).await {
            cancel.cancel();
            controller.shutdown().await;
            return Err(err).with_context(|| format!("Failed to start {mode} recording"));
        }
    }
    info!(modes = ?modes, "Recording; press Ctrl-C to stop");

    let pump_finished = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            false
        }
        joined = &mut pump => {
            if let Err(err) = joined {
                warn!(?err, "event pump task failed");
            }
            warn!("Browser connection closed; writing what was recorded");
            true
        }
    };
    controller.shutdown().await;
    cancel.cancel();
    if !pump_finished {
        if let Err(err) = pump.await {
            warn!(?err, "event pump task failed");
        }
    }

    let mut written = Vec::new();
    if modes.contains(&Mode::Network) {
        let path = args.out_dir.join(NETWORK_FLOW_FILE);
        let entries = controller.network_entries();
        let count = entries.len();
        write_flow_file(&path, entries)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push((path, count));
    }
    if modes.contains(&Mode::Ui) {
        let path = args.out_dir.join(UI_FLOW_FILE);
        let entries = controller.ui_entries();
        let count = entries.len();
        write_flow_file(&path, entries)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push((path, count));
    }

    match ctx.output() {
        OutputFormat::Human => {
            for (path, count) in &written {
                println!("{} records -> {}", count, path.display());
            }
        }
        OutputFormat::Json | OutputFormat::Yaml => {
            let report: Vec<_> = written
                .iter()
                .map(|(path, count)| json!({ "path": path.display().to_string(), "records": count }))
                .collect();
            if matches!(ctx.output(), OutputFormat::Json) {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", serde_yaml::to_string(&report)?);
            }
        }
    }
    Ok(())
}
