/// Output formatting for the `search`/`related` subcommands
///
/// Supports a human-readable text rendering (default, for a terminal) and a
/// JSON array (for piping into another tool). NDJSON streams one result per
/// line, useful for large top-k values consumed incrementally.
use crate::model::SearchResult;
use anyhow::Result;
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One result block per line, human-readable (default for a terminal)
    Text,
    /// Standard JSON array (pretty-printed)
    Json,
    /// Newline-delimited JSON (streaming)
    Ndjson,
}

pub struct OutputWriter {
    format: OutputFormat,
    writer: Box<dyn Write>,
}

impl OutputWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            writer: Box::new(io::stdout()),
        }
    }

    pub fn write_results(&mut self, results: &[SearchResult]) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                writeln!(self.writer, "{}", serde_json::to_string_pretty(results)?)?;
            }
            OutputFormat::Ndjson => {
                for result in results {
                    writeln!(self.writer, "{}", serde_json::to_string(result)?)?;
                }
            }
            OutputFormat::Text => {
                for (rank, result) in results.iter().enumerate() {
                    writeln!(
                        self.writer,
                        "{:>3}. [{:>5.1}] {:?}  {}:{}",
                        rank + 1,
                        result.final_score,
                        result.tier,
                        result.file_path,
                        result.line
                    )?;
                    for line in result.content.lines().take(6) {
                        writeln!(self.writer, "     {}", line)?;
                    }
                    writeln!(self.writer)?;
                }
            }
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TierLabel;
    use std::collections::HashMap;

    fn sample() -> SearchResult {
        SearchResult {
            id: "sym1".to_string(),
            content: "fn render() {}".to_string(),
            file_path: "widget.rs".to_string(),
            line: 3,
            final_score: 91.5,
            tier: TierLabel::ExactMatch,
            sub_scores: HashMap::new(),
            window_context: None,
            parent_context: None,
            contextualized_content: None,
        }
    }

    #[test]
    fn json_format_writes_an_array() {
        let mut writer = OutputWriter::new(OutputFormat::Json);
        writer.write_results(&[sample()]).unwrap();
    }

    #[test]
    fn text_format_does_not_panic_on_empty_results() {
        let mut writer = OutputWriter::new(OutputFormat::Text);
        writer.write_results(&[]).unwrap();
    }
}
