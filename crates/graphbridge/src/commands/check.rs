//! `graphbridge check` - verify the graph server is reachable.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use console::style;
use graphbridge_mcp::McpClient;
use serde_json::json;

use super::{Context, server_config};

/// Arguments for `graphbridge check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// List every tool the server offers
    #[arg(long)]
    pub tools: bool,
}

/// Run the check command.
pub async fn run(args: CheckArgs, ctx: &Context) -> Result<ExitCode> {
    let graph = ctx.config().graph();
    let config = server_config(&graph)?;
    let wanted = graph.tool().to_string();

    if !ctx.json_output {
        println!("Checking graph server: {}", graph.name());
        println!("  Command: {} {}", config.command, config.args.join(" "));
        println!();
    }

    let mut client = match McpClient::open(config).await {
        Ok(client) => client,
        Err(e) => {
            if ctx.json_output {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "status": "error",
                        "phase": "open",
                        "error": e.to_string(),
                    }))?
                );
            } else {
                println!("{} Session failed: {}", style("✗").red(), e);
            }
            return Ok(ExitCode::from(2));
        }
    };

    let (server_name, server_version) = client
        .server_info()
        .map(|info| (info.name.clone(), info.version.clone()))
        .unwrap_or_default();
    if !ctx.json_output {
        println!("{} Initialized: {} v{}", style("✓").green(), server_name, server_version);
    }

    let tools = client.list_tools().await;
    let shutdown = client.shutdown().await;
    let tools = match tools {
        Ok(tools) => tools,
        Err(e) => {
            if ctx.json_output {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "status": "error",
                        "phase": "list_tools",
                        "error": e.to_string(),
                    }))?
                );
            } else {
                println!("{} Listing tools failed: {}", style("✗").red(), e);
            }
            return Ok(ExitCode::from(2));
        }
    };
    if let Err(e) = shutdown {
        tracing::warn!(error = %e, "graph server did not shut down cleanly");
    }

    let found = tools.iter().any(|t| t.name == wanted);

    if ctx.json_output {
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "status": if found { "ok" } else { "missing_tool" },
                "server": {"name": server_name, "version": server_version},
                "tool": wanted,
                "tools": names,
            }))?
        );
    } else {
        if args.tools || ctx.verbose {
            println!("  Tools ({}):", tools.len());
            for tool in &tools {
                match &tool.description {
                    Some(desc) => println!("    {} - {}", style(&tool.name).cyan(), desc),
                    None => println!("    {}", style(&tool.name).cyan()),
                }
            }
        }
        if found {
            println!("{} Tool available: {}", style("✓").green(), wanted);
        } else {
            println!(
                "{} Tool '{}' not offered by the server ({} tools listed)",
                style("✗").red(),
                wanted,
                tools.len()
            );
        }
    }

    Ok(if found {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}
