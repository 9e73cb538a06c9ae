//! `graphbridge extract` - offline fact extraction from a saved sync response.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::Args;
use console::style;
use graphbridge_store::SyncBatch;
use graphbridge_sync::{FactExtractor, KnowledgeFact};
use serde::Serialize;
use serde_json::Value;

use super::Context;

/// Arguments for `graphbridge extract`.
#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// JSON file shaped like the store's sync response (`{"items": [...]}`)
    /// or a bare array of items
    pub file: PathBuf,

    /// Group id to file facts under (defaults to graph.group_id)
    #[arg(long)]
    pub group_id: Option<String>,
}

#[derive(Serialize)]
struct ExtractedItem<'a> {
    item_id: &'a graphbridge_store::ItemId,
    facts: Vec<KnowledgeFact>,
}

/// Run the extract command.
pub async fn run(args: ExtractArgs, ctx: &Context) -> Result<ExitCode> {
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let document: Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", args.file.display()))?;

    let raw_items = match document {
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => items,
            _ => anyhow::bail!("{} has no \"items\" array", args.file.display()),
        },
        Value::Array(items) => items,
        _ => anyhow::bail!("{} must hold an object or an array", args.file.display()),
    };

    let batch = SyncBatch::from_raw_items(raw_items);
    let group_id = args
        .group_id
        .unwrap_or_else(|| ctx.config().graph().group_id().to_string());
    let extractor = FactExtractor::new(group_id);

    let extracted: Vec<ExtractedItem<'_>> = batch
        .items
        .iter()
        .map(|item| ExtractedItem {
            item_id: &item.id,
            facts: extractor.extract(&item.analysis),
        })
        .collect();

    if ctx.json_output {
        let output = serde_json::json!({
            "items": extracted,
            "rejected": batch.rejected,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(ExitCode::SUCCESS);
    }

    for item in &extracted {
        println!("{} ({} facts)", style(item.item_id).bold(), item.facts.len());
        for fact in &item.facts {
            println!("  {}", fact.content);
        }
    }
    for rejected in &batch.rejected {
        println!(
            "{} {}",
            style(&rejected.id).bold(),
            style(format!("unreadable: {}", rejected.reason)).red()
        );
    }
    if ctx.verbose {
        let total: usize = extracted.iter().map(|i| i.facts.len()).sum();
        eprintln!("{} items, {} facts", extracted.len(), total);
    }

    Ok(ExitCode::SUCCESS)
}
