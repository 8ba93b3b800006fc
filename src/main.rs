use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use toolcall_rs::core::{ResultEvent, ToolCallSession};
use toolcall_rs::tools::helpers::log_records;
use toolcall_rs::utils::config::PipelineConfig;
use tracing_subscriber::EnvFilter;

/// Replay an assistant transcript through the tool call pipeline
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Assistant output to replay
    #[arg(long)]
    transcript: PathBuf,

    /// Tool results, one JSON object per line: {"id", "function_name", "payload"}
    #[arg(long)]
    results: Option<PathBuf>,

    /// Bytes appended to the buffer per update
    #[arg(long, default_value_t = 16)]
    chunk_size: usize,

    /// Pipeline config (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Record id prefix, overrides the config
    #[arg(long)]
    id_prefix: Option<String>,

    #[arg(long, default_value_t = false)]
    log: bool,
}

/// Cumulative prefixes of `text`, growing by about `chunk_size` bytes and
/// always ending on a char boundary.
fn chunk_ends(text: &str, chunk_size: usize) -> Vec<usize> {
    let step = chunk_size.max(1);
    let mut ends = Vec::new();
    let mut end = 0;
    while end < text.len() {
        end = (end + step).min(text.len());
        while !text.is_char_boundary(end) {
            end += 1;
        }
        ends.push(end);
    }
    ends
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let default_level = if args.log { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if args.id_prefix.is_some() {
        config.id_prefix = args.id_prefix.clone();
    }

    let transcript = std::fs::read_to_string(&args.transcript)
        .with_context(|| format!("reading transcript {}", args.transcript.display()))?;

    let mut session = ToolCallSession::new(&config);
    for end in chunk_ends(&transcript, args.chunk_size) {
        let update = session.update(&transcript[..end]);
        for id in &update.removed {
            tracing::info!("{} withdrawn", id);
        }
        for id in &update.created {
            if let Some(label) = session.record(id).map(|r| r.function_name().to_string()) {
                tracing::info!("{} started: {}", id, label);
            }
        }
    }
    if let Some(label) = session.active_label() {
        tracing::info!("{}", label);
    }

    if let Some(path) = &args.results {
        let results = std::fs::read_to_string(path)
            .with_context(|| format!("reading results {}", path.display()))?;
        for (line_no, line) in results.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let event: ResultEvent = serde_json::from_str(line).with_context(|| {
                format!("{}:{}: invalid result event", path.display(), line_no + 1)
            })?;
            if let Err(err) = session.attach_result(event) {
                tracing::warn!("{}:{}: {}", path.display(), line_no + 1, err);
            }
        }
    }

    log_records("Final", session.records());
    tracing::info!("Visible text: {:?}", session.visible_text(&transcript));
    println!("{}", serde_json::to_string_pretty(session.records())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_ends_respect_char_boundaries() {
        let text = "ab\u{00e9}cd\u{1f600}e";
        let ends = chunk_ends(text, 3);
        assert_eq!(ends.last(), Some(&text.len()));
        assert!(ends.iter().all(|&e| text.is_char_boundary(e)));
        assert!(ends.windows(2).all(|w| w[0] < w[1]));
        assert!(chunk_ends("", 4).is_empty());
        assert_eq!(chunk_ends("abc", 0), vec![1, 2, 3]);
    }
}
