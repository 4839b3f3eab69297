use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use flowtap::{FlowFilter, FlowSummary};
use flowtap_flow_store::{read_flow_file, FlowRecord};
use serde::Serialize;

use crate::cli::context::CliContext;
use crate::cli::output::OutputFormat;

#[derive(Args, Clone, Debug)]
pub struct InspectArgs {
    /// Exported flow file (JSON array of records)
    pub file: PathBuf,

    /// Keep requests whose URL contains this text (case-insensitive)
    #[arg(long)]
    pub url: Option<String>,

    /// Keep requests with exactly this method
    #[arg(long)]
    pub method: Option<String>,

    /// Keep requests with exactly this status
    #[arg(long)]
    pub status: Option<String>,
}

#[derive(Serialize)]
struct InspectReport<'a> {
    summary: FlowSummary,
    matched: usize,
    entries: Vec<&'a FlowRecord>,
}

pub async fn cmd_inspect(args: InspectArgs, ctx: &CliContext) -> Result<()> {
    let records = read_flow_file(&args.file)
        .with_context(|| format!("Failed to import {}", args.file.display()))?;
    let summary = FlowSummary::of(&records);
    let filter = FlowFilter::new(args.url, args.method, args.status);
    let entries = filter.apply(&records);

    match ctx.output() {
        OutputFormat::Human => {
            println!(
                "Total: {} | Failed: {} | Avg: {} ms",
                summary.total, summary.failed, summary.avg_duration_ms
            );
            println!("{} / {} records", entries.len(), records.len());
            for record in &entries {
                println!("{}", describe(record));
            }
        }
        OutputFormat::Json => {
            let report = InspectReport {
                summary,
                matched: entries.len(),
                entries,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Yaml => {
            let report = InspectReport {
                summary,
                matched: entries.len(),
                entries,
            };
            print!("{}", serde_yaml::to_string(&report)?);
        }
    }
    Ok(())
}

fn describe(record: &FlowRecord) -> String {
    match record {
        FlowRecord::Network(record) => {
            let status = record
                .status()
                .map(|status| status.to_string())
                .or_else(|| record.error_text.clone())
                .unwrap_or_else(|| "-".to_string());
            format!(
                "#{:<4} {:<7} {:<5} {} ({} ms)",
                record.step, record.request.method, status, record.request.url, record.duration_ms
            )
        }
        FlowRecord::InitialScreen(record) => {
            format!("#{:<4} INITIAL_SCREEN {}", record.step, record.route)
        }
        FlowRecord::UiStep(record) => format!(
            "#{:<4} {} <{}> {:?} {}",
            record.step, record.event, record.element, record.text, record.route
        ),
    }
}
