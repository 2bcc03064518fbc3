//! Offline queue commands

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use dialoguer::Confirm;
use log::debug;
use tokio::sync::broadcast::error::RecvError;

use crate::cli::CommandContext;
use crate::cli::OutputFormat;
use crate::cli::args::GlobalOptions;
use crate::cli::context::{LocalContext, report_drain};
use crate::error::Result;
use crate::models::QueuedOperationDisplay;
use crate::network::{ConnectivityProbe, FixedProbe, HttpProbe};
use crate::output::{Formattable, spinner};
use crate::session::SessionState;

/// List queued writes, oldest first
pub fn list(opts: &GlobalOptions) -> Result<()> {
    let local = LocalContext::open(opts)?;
    let queue = local.queue();

    let rows: Vec<QueuedOperationDisplay> = queue
        .list()
        .iter()
        .map(QueuedOperationDisplay::from)
        .collect();
    if rows.is_empty() && local.format != OutputFormat::Json {
        println!("No queued writes.");
        return Ok(());
    }
    rows.print(local.format)
}

/// Replay queued writes now
pub async fn drain(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    let queue = ctx.orchestrator.queue();

    if queue.is_empty() {
        println!("No queued writes.");
        return Ok(());
    }
    if ctx.orchestrator.network().is_offline() {
        println!(
            "{} Platform unreachable; {} write(s) stay queued",
            "⚠".yellow(),
            queue.len()
        );
        return Ok(());
    }

    let pb = spinner(ctx.format, &format!("Sending {} queued write(s)...", queue.len()));
    let report = ctx.session.replay_queue().await;
    pb.finish_and_clear();

    report_drain(&report?);
    if queue.is_empty() {
        println!("{} Queue is empty", "✓".green());
    }
    Ok(())
}

/// Stay up until the queue is empty, draining whenever we are online
pub async fn watch(opts: &GlobalOptions, interval_secs: u64) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    let queue = ctx.orchestrator.queue();
    if queue.is_empty() {
        println!("No queued writes.");
        return Ok(());
    }

    let interval = Duration::from_secs(interval_secs.max(1));
    let probe: Arc<dyn ConnectivityProbe> = if opts.offline {
        Arc::new(FixedProbe::offline())
    } else {
        let api_url = ctx.config.require_api_url(opts.api_url_ref())?;
        Arc::new(HttpProbe::new(api_url))
    };
    let watcher = ctx.orchestrator.network().spawn_watcher(probe, interval);
    let listener = ctx.session.spawn_drain_listener();
    let mut failures = queue.subscribe_failures();
    let mut ticker = tokio::time::interval(interval);

    println!(
        "Waiting to send {} queued write(s) (Ctrl-C to stop)",
        queue.len()
    );
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            failure = failures.recv() => match failure {
                Ok(failure) => eprintln!("{} {}", "✗".red(), failure.to_error()),
                Err(RecvError::Lagged(missed)) => debug!("Missed {} failure notices", missed),
                Err(RecvError::Closed) => break,
            },
            _ = ticker.tick() => {
                if queue.is_empty() {
                    println!("{} Queue is empty", "✓".green());
                    break;
                }
                if ctx.session.state() == SessionState::Unauthenticated {
                    eprintln!(
                        "{} Session ended; run 'edureg login', {} write(s) stay queued",
                        "✗".red(),
                        queue.len()
                    );
                    break;
                }
                if !ctx.orchestrator.network().is_offline() {
                    match ctx.session.replay_queue().await {
                        Ok(report) => report_drain(&report),
                        Err(e) => debug!("Queued writes not replayed: {}", e),
                    }
                }
            }
        }
    }

    watcher.abort();
    listener.abort();
    Ok(())
}

/// Discard every queued write
pub fn clear(opts: &GlobalOptions, yes: bool) -> Result<()> {
    let local = LocalContext::open(opts)?;
    let queue = local.queue();

    if queue.is_empty() {
        println!("No queued writes.");
        return Ok(());
    }
    if !yes {
        let confirm = Confirm::new()
            .with_prompt(format!("Discard {} queued write(s)?", queue.len()))
            .default(false)
            .interact()?;
        if !confirm {
            println!("Aborted.");
            return Ok(());
        }
    }

    let removed = queue.clear()?;
    println!("{} Discarded {} queued write(s)", "✓".green(), removed);
    Ok(())
}
