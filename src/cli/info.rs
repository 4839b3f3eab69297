use anyhow::Result;
use serde_json::json;

use crate::cli::context::CliContext;
use crate::cli::output::OutputFormat;

pub async fn cmd_info(ctx: &CliContext) -> Result<()> {
    let config = ctx.config();
    let cdp = config.cdp.to_cdp_config();
    let browser = match (&cdp.websocket_url, cdp.resolve_executable()) {
        (Some(url), _) => format!("remote ({url})"),
        (None, Some(path)) => format!("launch {}", path.display()),
        (None, None) => "not found".to_string(),
    };

    if !matches!(ctx.output(), OutputFormat::Human) {
        let info = json!({
            "version": env!("CARGO_PKG_VERSION"),
            "buildDate": env!("BUILD_DATE"),
            "gitHash": env!("GIT_HASH"),
            "gitBranch": env!("GIT_BRANCH"),
            "configPath": ctx.config_path().display().to_string(),
            "browser": browser,
            "capture": config.capture,
            "controlAddr": config.server.control_addr.to_string(),
            "metricsPort": ctx.metrics_port(),
        });
        match ctx.output() {
            OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&info)?),
            _ => println!("{}", serde_json::to_string_pretty(&info)?),
        }
        return Ok(());
    }

    println!("FlowTap System Information");
    println!("==========================");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Build Date: {}", env!("BUILD_DATE"));
    println!("Git Commit: {} ({})", env!("GIT_HASH"), env!("GIT_BRANCH"));
    println!();

    println!("Configuration:");
    println!("- Config File: {}", ctx.config_path().display());
    println!("- Browser: {}", browser);
    if let Some(target) = &config.cdp.target_id {
        println!("- Pinned Target: {}", target);
    }
    println!("- Control Address: {}", config.server.control_addr);
    println!(
        "- Metrics Port: {}",
        match ctx.metrics_port() {
            0 => "disabled".to_string(),
            port => port.to_string(),
        }
    );
    println!();

    let capture = &config.capture;
    println!("Capture Settings:");
    println!("- Request Headers: {}", on_off(capture.include_request_headers));
    println!("- Response Headers: {}", on_off(capture.include_response_headers));
    println!("- Network Screenshots: {}", on_off(capture.capture_network_screenshots));
    println!("- UI Screenshots: {}", on_off(capture.capture_ui_screenshots));

    Ok(())
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}
