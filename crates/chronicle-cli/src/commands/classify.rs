use std::path::PathBuf;

use chronicle_memory::classify::{Classification, classify_legacy, classify_summary};
use chronicle_memory::memory::MemoryChunk;
use clap::Parser;

use crate::context::read_summary;
use crate::error::CliResult;
use crate::output::{OutputFormat, new_table, print_json, truncate_string};

#[derive(Parser)]
pub struct ClassifyCommand {
    #[clap(help = "Summary text file")]
    pub file: PathBuf,

    #[clap(long, default_value = "0", help = "First message index the summary covers")]
    pub start: u64,

    #[clap(long, default_value = "0", help = "Last message index the summary covers")]
    pub end: u64,

    #[clap(long = "keyword", help = "Keyword attached to every chunk (repeatable)")]
    pub keywords: Vec<String>,
}

impl ClassifyCommand {
    pub fn execute(&self, format: OutputFormat) -> CliResult<()> {
        if self.end < self.start {
            return Err(format!("--end ({}) is before --start ({})", self.end, self.start).into());
        }
        let text = read_summary(&self.file)?;

        let mut classification = classify_summary(&text, self.start, self.end, &self.keywords);
        let legacy = classification.is_empty() && !text.trim().is_empty();
        if legacy {
            classification = Classification {
                chunks: vec![classify_legacy(&text, self.start, self.end, &self.keywords)],
                resolved_entities: Vec::new(),
            };
        }

        match format {
            OutputFormat::Json => print_json(&serde_json::json!({
                "legacy": legacy,
                "chunks": &classification.chunks,
                "resolved_entities": &classification.resolved_entities,
            })),
            OutputFormat::Table => {
                if classification.chunks.is_empty() {
                    println!("Nothing to classify.");
                    return Ok(());
                }
                print_chunks(&classification.chunks);
                if legacy {
                    println!("\nNo recognized sections; stored as one legacy chunk.");
                }
                for entity in &classification.resolved_entities {
                    println!(
                        "Resolved: {} '{}'",
                        entity.section_type.label(),
                        entity.entity_key
                    );
                }
                println!("\nTotal: {} chunks", classification.chunks.len());
                Ok(())
            }
        }
    }
}

pub(crate) fn print_chunks(chunks: &[MemoryChunk]) {
    let mut table = new_table(["Hash", "Behavior", "Section", "Key", "Importance", "Text"]);
    for chunk in chunks {
        let section = chunk
            .metadata
            .section_type
            .map(|s| s.label().to_string())
            .unwrap_or_else(|| {
                chunk
                    .metadata
                    .section_types
                    .iter()
                    .map(|s| s.label())
                    .collect::<Vec<_>>()
                    .join(", ")
            });
        let key = chunk
            .metadata
            .entity_key
            .as_deref()
            .or(chunk.scene_code())
            .unwrap_or("-");
        table.add_row([
            format!("{:014x}", chunk.hash),
            chunk.behavior().as_str().to_string(),
            section,
            key.to_string(),
            chunk.importance().to_string(),
            truncate_string(&chunk.text, 60),
        ]);
    }
    println!("{table}");
}
