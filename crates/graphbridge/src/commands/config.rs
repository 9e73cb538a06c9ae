//! `graphbridge config` - inspect the resolved configuration.

use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Subcommand};
use console::style;
use serde_json::json;

use super::Context;

/// Configuration commands.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the merged configuration and the files it came from
    Show,

    /// Print the user config directory
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<ExitCode> {
    match args.command {
        ConfigCommand::Show => show(ctx)?,
        ConfigCommand::Path => path(ctx)?,
    }
    Ok(ExitCode::SUCCESS)
}

fn show(ctx: &Context) -> Result<()> {
    let loaded = &ctx.loaded;

    if ctx.json_output {
        let sources: Vec<_> = loaded
            .sources
            .iter()
            .map(|s| json!({"path": s.path.display().to_string(), "loaded": s.loaded}))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "config": loaded.config,
                "sources": sources,
                "warnings": loaded.warnings,
            }))?
        );
        return Ok(());
    }

    println!("{}", style("Config sources").bold());
    for source in &loaded.sources {
        let marker = if source.loaded {
            style("loaded").green()
        } else {
            style("absent").dim()
        };
        println!("  {} {}", marker, source.path.display());
    }
    for warning in &loaded.warnings {
        println!("  {} {}", style("warning").yellow(), warning);
    }

    let config = &loaded.config;
    let graph = config.graph();
    println!();
    println!("{}", style("Effective settings").bold());
    println!("  store.base_url      {}", style(config.store_url()).cyan());
    println!("  store.timeout       {}s", config.store_timeout().as_secs());
    println!("  graph.name          {}", graph.name());
    println!(
        "  graph.command       {}",
        graph.command.as_deref().unwrap_or("(not set)")
    );
    println!("  graph.tool          {}", graph.tool());
    println!("  graph.group_id      {}", graph.group_id());
    match config.run_timeout() {
        Some(t) => println!("  sync.run_timeout    {}s", t.as_secs()),
        None => println!("  sync.run_timeout    (none)"),
    }

    if ctx.verbose {
        println!();
        println!("{}", style("Merged TOML").bold());
        print!("{}", config.to_toml()?);
    }
    Ok(())
}

fn path(ctx: &Context) -> Result<()> {
    let dir = graphbridge_config::config_dir();
    if ctx.json_output {
        println!(
            "{}",
            json!({"config_dir": dir.as_ref().map(|d| d.display().to_string())})
        );
    } else {
        match dir {
            Some(dir) => println!("{}", dir.display()),
            None => println!("(no config directory on this platform)"),
        }
    }
    Ok(())
}
