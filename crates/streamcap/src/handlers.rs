use std::time::Duration;

use serde_json::json;
use tracing::info;

use streamcap_core::{RecorderAgent, SignalHandler};
use streamcap_ipc::{StopSelector, list_records, prune_stale, request_stop, status_dir};

use crate::commands::CaptureArgs;

pub type HandlerResult = Result<(), Box<dyn std::error::Error>>;

pub fn handle_record(capture: CaptureArgs) -> HandlerResult {
    let config = capture.to_config();
    let agent = RecorderAgent::new(config);
    let _signals = SignalHandler::setup(agent.shutdown_token())?;

    let runtime = tokio::runtime::Runtime::new()?;
    let files = runtime.block_on(agent.record(&capture.url))?;
    for file in &files {
        println!("{}", file.display());
    }
    info!(url = %capture.url, files = files.len(), "recording finished");
    Ok(())
}

pub fn handle_monitor(interval_secs: u64, capture: CaptureArgs) -> HandlerResult {
    let config = capture
        .to_config()
        .with_monitor_interval(Duration::from_secs(interval_secs.max(1)));
    let agent = RecorderAgent::new(config);
    let _signals = SignalHandler::setup(agent.shutdown_token())?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(agent.monitor(&capture.url))?;
    println!("Monitor for {} stopped", capture.url);
    Ok(())
}

pub fn handle_list(prune: bool, json: bool) -> HandlerResult {
    let dir = status_dir();

    if prune {
        let removed = prune_stale(&dir)?;
        if !json && removed > 0 {
            println!("Pruned {removed} stale record(s)");
        }
    }

    let entries = list_records(&dir)?;

    if json {
        let items: Vec<_> = entries
            .iter()
            .map(|e| {
                json!({
                    "id": e.ordinal,
                    "pid": e.record.pid,
                    "is_recording": e.record.is_recording,
                    "is_monitoring": e.record.is_monitoring,
                    "monitor_url": e.record.monitor_url,
                    "alive": e.alive,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No active recorders");
        return Ok(());
    }
    for entry in &entries {
        let activity = match (entry.record.is_recording, entry.record.is_monitoring) {
            (true, true) => "monitoring+recording",
            (true, false) => "recording",
            (false, true) => "monitoring",
            (false, false) => "idle",
        };
        let staleness = if entry.alive { "" } else { "  [stale]" };
        println!(
            "{:>3}. pid {:<8} {:<20} {}{}",
            entry.ordinal,
            entry.record.pid,
            activity,
            entry.record.monitor_url.as_deref().unwrap_or("-"),
            staleness,
        );
    }
    Ok(())
}

pub fn handle_stop(id: Option<usize>, url: Option<String>, all: bool) -> HandlerResult {
    let selector = if all {
        StopSelector::All
    } else if let Some(ordinal) = id {
        StopSelector::Ordinal(ordinal)
    } else if let Some(url) = url {
        StopSelector::Url(url)
    } else {
        return Err("specify --id, --url, or --all (see `streamcap list`)".into());
    };

    let receipts = request_stop(&status_dir(), &selector)?;
    if receipts.is_empty() {
        return Err("no matching active recorder".into());
    }
    for receipt in &receipts {
        println!(
            "Stop requested for pid {} ({})",
            receipt.pid,
            receipt.url.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
