//! `graphbridge sync` - one run of the bridge.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use console::style;
use graphbridge_sync::coordinator;
use graphbridge_sync::{
    AckStatus, McpConnector, RunStatus, RunSummary, SyncConfig, SyncCoordinator, SyncPlan,
};
use tokio_util::sync::CancellationToken;

use super::{Context, server_config};

/// Arguments for `graphbridge sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Fetch and extract only; submit and acknowledge nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Deadline for the whole run, in seconds (overrides sync.run_timeout_secs)
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Run the sync command.
pub async fn run(args: SyncArgs, ctx: &Context) -> Result<ExitCode> {
    let mut config = ctx.config().clone();
    if let Some(secs) = args.timeout {
        anyhow::ensure!(secs > 0, "--timeout must be at least 1 second");
        config.set_run_timeout_secs(secs);
    }
    let graph = config.graph();

    let sync_config = SyncConfig::default()
        .with_group_id(graph.group_id())
        .with_tool_name(graph.tool())
        .with_run_timeout(config.run_timeout())
        .with_fetch_timeout(Some(config.store_timeout()))
        .with_acknowledge_timeout(Some(config.store_timeout()));

    let store = Arc::new(ctx.store_client()?);

    if args.dry_run {
        let plan = coordinator::plan(store.as_ref(), &sync_config).await?;
        print_plan(&plan, ctx)?;
        return Ok(ExitCode::SUCCESS);
    }

    let connector = Arc::new(McpConnector::new(server_config(&graph)?));
    let coordinator = SyncCoordinator::new(sync_config, store, connector);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; finishing current item and shutting down");
            on_signal.cancel();
        }
    });

    let summary = coordinator.run(cancel).await;
    signal_task.abort();

    print_summary(&summary, ctx)?;
    let code = summary.status().exit_code();
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(2)))
}

fn print_plan(plan: &SyncPlan, ctx: &Context) -> Result<()> {
    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(plan)?);
        return Ok(());
    }

    println!("{}", style("Dry run").bold());
    println!(
        "  Items: {}  Facts: {}  Unreadable: {}",
        style(plan.items.len()).cyan(),
        style(plan.fact_count()).cyan(),
        style(plan.rejected.len()).cyan()
    );
    for item in &plan.items {
        println!();
        println!("{} ({} facts)", style(&item.item_id).bold(), item.facts.len());
        for fact in &item.facts {
            println!("  - {}", fact.content);
        }
    }
    for rejected in &plan.rejected {
        println!();
        println!(
            "{} {}",
            style(&rejected.id).bold(),
            style(format!("unreadable: {}", rejected.reason)).red()
        );
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, ctx: &Context) -> Result<()> {
    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    let status = match summary.status() {
        RunStatus::Success => style("success").green(),
        RunStatus::PartialFailure => style("partial failure").yellow(),
        RunStatus::Aborted => style("aborted").red(),
    };
    println!("{} {}", style("Sync run").bold(), status);
    if ctx.verbose {
        println!("  Run:          {}", summary.run_id);
        let duration = summary.duration().to_std().unwrap_or(Duration::ZERO);
        println!("  Duration:     {:.1}s", duration.as_secs_f64());
    }
    println!("  Fetched:      {}", style(summary.fetched).cyan());
    println!("  Succeeded:    {}", style(summary.succeeded).cyan());
    println!("  Failed:       {}", style(summary.failed).cyan());
    if summary.skipped > 0 {
        println!("  Skipped:      {}", style(summary.skipped).cyan());
    }
    println!("  Facts:        {}", style(summary.facts_submitted).cyan());

    match &summary.acknowledgement {
        AckStatus::NotNeeded => println!("  Acknowledged: -"),
        AckStatus::Acknowledged { count } => {
            println!("  Acknowledged: {}", style(count).cyan())
        }
        AckStatus::Failed { ids, error } => {
            println!(
                "  Acknowledged: {} ({} delivered items still unsynced: {})",
                style("failed").red(),
                ids.len(),
                error
            );
        }
    }

    if let Some(abort) = &summary.aborted {
        println!();
        println!(
            "{} during {:?}: {}",
            style("Aborted").red().bold(),
            abort.phase,
            abort.error
        );
    }
    if summary.cancelled {
        println!();
        println!("{}", style("Run was interrupted before all items were processed.").yellow());
    }

    let failures: Vec<_> = summary.outcomes.iter().filter(|o| !o.is_success()).collect();
    if !failures.is_empty() {
        println!();
        println!("{}", style("Failed items").bold());
        for outcome in failures {
            println!(
                "  {} {}",
                style(&outcome.item_id).bold(),
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    Ok(())
}
