use std::path::PathBuf;
use std::sync::Arc;

use chronicle_memory::debug::DebugHarness;
use chronicle_memory::injection::InjectionSlot;
use clap::Parser;

use super::retrieve::build_request;
use crate::context::Context;
use crate::error::CliResult;
use crate::output::{OutputFormat, new_table, print_json, truncate_string};

#[derive(Parser)]
pub struct DebugCommand {
    #[clap(help = "Conversation id")]
    pub conversation: String,

    #[clap(help = "JSON file with the recent turns")]
    pub turns: PathBuf,

    #[clap(long, default_value = "normal", help = "Generation type")]
    pub generation: String,

    #[clap(long, help = "Print each stage's surviving chunks")]
    pub verbose: bool,
}

impl DebugCommand {
    pub async fn execute(&self, ctx: &Context, format: OutputFormat) -> CliResult<()> {
        let request = build_request(&self.conversation, &self.turns, &self.generation)?;

        let store = ctx.store().await?;
        let orchestrator = ctx.orchestrator(store, Arc::new(InjectionSlot::new()))?;
        let report = DebugHarness::new(Arc::new(orchestrator)).run(&request).await;

        match format {
            OutputFormat::Json => print_json(&report),
            OutputFormat::Table => {
                println!("Run {}", report.run_id);
                println!("Query:\n{}\n", report.query);

                let mut table = new_table(["Stage", "In", "Out", "Time (ms)"]);
                for stage in &report.stages {
                    table.add_row([
                        serde_json::to_value(stage.stage)?
                            .as_str()
                            .unwrap_or_default()
                            .to_string(),
                        stage.input_count.to_string(),
                        stage.output_count.to_string(),
                        format!("{:.2}", stage.elapsed_ms),
                    ]);
                }
                println!("{table}\n");

                if self.verbose {
                    for stage in &report.stages {
                        if stage.snapshot.is_empty() {
                            continue;
                        }
                        println!("{:?}:", stage.stage);
                        for result in &stage.snapshot {
                            println!(
                                "  {:.4}  {}",
                                result.score,
                                truncate_string(&result.chunk.text, 70)
                            );
                        }
                    }
                    println!();
                }

                println!("Outcome: {}", report.outcome);
                if let Some(text) = &report.would_inject {
                    println!("\nWould inject:\n{text}");
                }
                Ok(())
            }
        }
    }
}
