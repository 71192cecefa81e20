//! Command-line front end: tokenize a text, restore saved state, run one
//! selection (and optionally a hover) and print the live spans.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use clap::Parser;
use regex::Regex;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::engine::{Engine, SelectionMode};
use crate::persist::sqlite::SqliteStore;
use crate::translate::deepseek::DeepSeekTranslator;

#[derive(Parser, Debug)]
#[command(name = "span-translator", about = "Translate selected spans of a text")]
pub struct Args {
    /// Text to read.
    #[arg(long)]
    pub text: String,

    /// Comma-separated token indices to select, e.g. 0,2,4.
    #[arg(long, value_delimiter = ',')]
    pub select: Vec<usize>,

    /// Source language code, or "auto".
    #[arg(long, default_value = "auto")]
    pub source: String,

    /// Target language code.
    #[arg(long, default_value = "en")]
    pub target: String,

    /// SQLite file holding translations and cache across runs.
    #[arg(long, default_value = "span_translator.db")]
    pub db: PathBuf,

    /// Optional JSON engine config.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Re-translate even when a cached translation exists.
    #[arg(long)]
    pub force: bool,

    /// Re-translate whole remainders of split spans.
    #[arg(long)]
    pub phrase: bool,

    /// Token index to preview as a hover.
    #[arg(long)]
    pub hover: Option<usize>,

    /// Print the token list with indices and exit.
    #[arg(long)]
    pub tokens: bool,
}

fn token_pattern() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"[\p{L}\p{N}\p{M}'’]+|\s+|[^\p{L}\p{N}\p{M}\s]").expect("static regex"))
}

/// Whitespace-preserving tokenizer: words, whitespace runs, single symbols.
pub fn tokenize(text: &str) -> Vec<String> {
    token_pattern()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

pub async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let tokens = tokenize(&args.text);
    if args.tokens {
        for (i, token) in tokens.iter().enumerate() {
            println!("{i}\t{token:?}");
        }
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::from_env(),
    };
    let translator = Arc::new(DeepSeekTranslator::from_env()?);
    let store = Arc::new(SqliteStore::open(&args.db)?);
    let engine = Engine::with_store(translator, config, store);

    if let Err(e) = engine.load().await {
        warn!(error = %e, "could not restore saved state, starting empty");
    }

    let selection: BTreeSet<usize> = args.select.iter().copied().collect();
    let mode = if args.phrase { SelectionMode::Phrase } else { SelectionMode::Word };
    let pending = engine.group_and_reconcile_mode(mode, &selection, &tokens, &args.source, &args.target, args.force);
    info!(tasks = pending.len(), "selection submitted");
    pending.wait().await;

    if let Some(index) = args.hover {
        engine.hover(index, &tokens, &args.source, &args.target).wait().await;
        let hover = engine.hover_state();
        println!(
            "hover {}: {}",
            index,
            hover.translation.as_deref().unwrap_or("(no translation)")
        );
    }

    for (key, translated) in engine.translations() {
        let span = key.parse()?;
        println!("{key}\t{}\t{translated}", crate::grouper::span_text(&tokens, span));
    }

    engine.save().await?;
    let summary = engine.metrics().summary();
    info!(metrics = %serde_json::to_string(&summary)?, "done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_preserves_whitespace_and_punctuation() {
        let tokens = tokenize("The cat, sat.\n\nDon't");
        assert_eq!(
            tokens,
            vec!["The", " ", "cat", ",", " ", "sat", ".", "\n\n", "Don't"]
        );
        assert_eq!(tokens.concat(), "The cat, sat.\n\nDon't");
    }

    #[test]
    fn args_parse_selection_list() {
        let args = Args::parse_from(["span-translator", "--text", "a b", "--select", "0,2", "--target", "es"]);
        assert_eq!(args.select, vec![0, 2]);
        assert_eq!(args.source, "auto");
        assert!(!args.force);
    }
}
