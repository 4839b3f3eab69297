use std::net::SocketAddr;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use flowtap::{metrics, server::serve_control};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::context::{connect_controller, CliContext};

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Address for the control surface (defaults to server.control_addr)
    #[arg(long)]
    pub addr: Option<SocketAddr>,

    /// Attach to an existing Chrome DevTools websocket
    #[arg(long)]
    pub ws_url: Option<String>,
}

pub async fn cmd_serve(args: ServeArgs, ctx: &CliContext) -> Result<()> {
    let mut config = ctx.config().clone();
    if let Some(ws_url) = args.ws_url {
        config.cdp.ws_url = Some(ws_url);
    }
    let addr = args.addr.unwrap_or(config.server.control_addr);

    let _metrics_server = metrics::spawn_metrics_server(ctx.metrics_port());
    let controller = connect_controller(&config).await?;
    let cancel = CancellationToken::new();
    let pump = controller.spawn_event_pump(cancel.child_token());

    // A closed browser connection cannot be recovered; take the control surface down with it.
    let watcher = {
        let controller = controller.clone();
        let shutdown = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = pump.await {
                warn!(?err, "event pump task failed");
            }
            if controller.is_channel_closed() {
                warn!("Browser connection closed; shutting down");
                shutdown.cancel();
            }
        })
    };

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received; shutting down"),
            Err(err) => warn!(?err, "failed to listen for Ctrl-C"),
        }
        shutdown.cancel();
    });

    let served = serve_control(addr, controller.clone(), cancel.clone())
        .await
        .context("Control surface failed");
    cancel.cancel();
    controller.shutdown().await;
    if let Err(err) = watcher.await {
        warn!(?err, "event pump watcher failed");
    }
    served?;
    if controller.is_channel_closed() {
        return Err(anyhow!("Browser connection closed"));
    }
    Ok(())
}
