use std::env;
use std::sync::Arc;

use lexfind_core::config::{Config, Settings};
use lexfind_core::types::{Query, TemplateMatch};
use lexfind_hybrid::TemplateFinder;
use lexfind_store::StoreRuntime;
use tracing_subscriber::EnvFilter;

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().collect();
    let prog = args.remove(0);
    if args.is_empty() { eprintln!("Usage: {} <query|health> [args...]", prog); std::process::exit(1); }
    let cmd = args.remove(0);
    (cmd, args)
}

/// Split `query` arguments into the request text and an optional `--lang <code>`.
fn query_from_args(args: &[String]) -> Option<Query> {
    let mut words = Vec::new();
    let mut language = None;
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        if arg == "--lang" { language = it.next().cloned(); } else { words.push(arg.as_str()); }
    }
    let text = words.join(" ");
    if text.trim().is_empty() { return None; }
    let query = Query::new(text);
    Some(match language { Some(l) => query.with_language(l), None => query })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();

    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.settings()?;
    let (cmd, args) = parse_args();
    let query = match cmd.as_str() {
        "query" => match query_from_args(&args) {
            Some(query) => Some(query),
            None => { eprintln!("Usage: lexfind query \"<request>\" [--lang <code>]"); std::process::exit(1) }
        },
        "health" => None,
        _ => { eprintln!("Unknown command: {}", cmd); std::process::exit(1); }
    };

    let runtime = StoreRuntime::open(&settings).await?;
    let outcome = match query {
        Some(query) => run_query(&runtime, &settings, query).await,
        None => {
            let health = runtime.health().await;
            println!("backend: {}", health.backend);
            if let Some(reachable) = health.tunnel_reachable { println!("tunnel reachable: {}", reachable); }
            if let Some(pool) = health.pool {
                println!("pool: idle={} in_use={} max={} closed={}", pool.idle, pool.in_use, pool.max, pool.closed);
            }
            Ok(())
        }
    };
    runtime.shutdown().await?;
    outcome
}

async fn run_query(runtime: &StoreRuntime, settings: &Settings, query: Query) -> anyhow::Result<()> {
    let finder = TemplateFinder::from_settings(Arc::clone(&runtime.store), settings);
    let (result, trace) = finder.retrieve(query).await?;
    tracing::debug!(phases = ?trace.phases, escalated = trace.escalated(), "retrieval trace");
    let found = result.as_ref().map(TemplateMatch::from);
    println!("{}", serde_json::to_string_pretty(&found)?);
    Ok(())
}
