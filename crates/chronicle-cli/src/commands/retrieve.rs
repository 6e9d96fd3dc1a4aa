use std::path::PathBuf;
use std::sync::Arc;

use chronicle_memory::injection::InjectionSlot;
use chronicle_memory::memory::RetrievalResult;
use chronicle_memory::retrieval::{GenerationType, RetrievalOutcome, RetrievalRequest};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use crate::context::{Context, read_turns};
use crate::error::CliResult;
use crate::output::{OutputFormat, new_table, print_json, truncate_string};

#[derive(Parser)]
pub struct RetrieveCommand {
    #[clap(help = "Conversation id")]
    pub conversation: String,

    #[clap(help = "JSON file with the recent turns")]
    pub turns: PathBuf,

    #[clap(
        long,
        default_value = "normal",
        help = "Generation type (normal, continue, swipe, regenerate, impersonate, quiet)"
    )]
    pub generation: String,
}

impl RetrieveCommand {
    pub async fn execute(&self, ctx: &Context, format: OutputFormat) -> CliResult<()> {
        let request = build_request(&self.conversation, &self.turns, &self.generation)?;

        let store = ctx.store().await?;
        let slot = Arc::new(InjectionSlot::new());
        let orchestrator = ctx.orchestrator(store, slot.clone())?;
        let outcome = orchestrator.retrieve(&request, &CancellationToken::new()).await;

        let results: &[RetrievalResult] = match &outcome {
            RetrievalOutcome::Injected { results, .. } => results.as_slice(),
            _ => &[],
        };

        match format {
            OutputFormat::Json => print_json(&serde_json::json!({
                "outcome": outcome.label(),
                "injected": slot.current().await,
                "results": results,
            }))?,
            OutputFormat::Table => {
                println!("Outcome: {}", outcome.label());
                if !results.is_empty() {
                    print_results(results);
                }
                if let Some(text) = slot.current().await {
                    println!("\n{text}");
                }
            }
        }

        match outcome {
            RetrievalOutcome::Failed(reason) => Err(reason.into()),
            _ => Ok(()),
        }
    }
}

fn print_results(results: &[RetrievalResult]) {
    let mut table = new_table(["#", "Score", "Behavior", "Text"]);
    for (i, result) in results.iter().enumerate() {
        table.add_row([
            (i + 1).to_string(),
            format!("{:.4}", result.score),
            result.chunk.behavior().as_str().to_string(),
            truncate_string(&result.chunk.text, 70),
        ]);
    }
    println!("{table}");
}

pub(crate) fn parse_generation(value: &str) -> CliResult<GenerationType> {
    let generation = match value.trim().to_ascii_lowercase().as_str() {
        "normal" => GenerationType::Normal,
        "continue" => GenerationType::Continue,
        "swipe" => GenerationType::Swipe,
        "regenerate" => GenerationType::Regenerate,
        "impersonate" => GenerationType::Impersonate,
        "quiet" => GenerationType::Quiet,
        other => return Err(format!("Unknown generation type: {other}").into()),
    };
    Ok(generation)
}

pub(crate) fn build_request(
    conversation: &str,
    turns: &std::path::Path,
    generation: &str,
) -> CliResult<RetrievalRequest> {
    let generation = parse_generation(generation)?;
    let turns = read_turns(turns)?;
    Ok(RetrievalRequest::new(conversation, turns).with_generation(generation))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generation() {
        assert_eq!(parse_generation("Quiet").unwrap(), GenerationType::Quiet);
        assert_eq!(parse_generation("swipe").unwrap(), GenerationType::Swipe);
        assert!(parse_generation("dream").is_err());
    }
}
