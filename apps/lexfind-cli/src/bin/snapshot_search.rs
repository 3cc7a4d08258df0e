use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use lexfind_core::config::{Config, Settings};
use lexfind_hybrid::TemplateFinder;
use lexfind_store::SnapshotCorpus;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <corpus.json|corpus.jsonl> <request>", args[0]);
        eprintln!("Example: {} data/corpus.json 'rental agrement'", args[0]);
        std::process::exit(1);
    }
    let corpus_path = PathBuf::from(&args[1]);
    let request = args[2..].join(" ");

    let corpus = SnapshotCorpus::load(&corpus_path)?;
    eprintln!("Loaded {} templates from {}", corpus.len(), corpus_path.display());
    let settings = match Config::load().and_then(|c| Ok(c.settings()?)) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!(error = %e, "config unavailable; using defaults");
            Settings::default()
        }
    };
    let finder = TemplateFinder::from_settings(Arc::new(corpus), &settings);
    let found = finder.find_best_template(&request).await?;
    println!("{}", serde_json::to_string_pretty(&found)?);
    Ok(())
}
