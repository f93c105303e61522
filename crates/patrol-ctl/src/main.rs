//! patrol-ctl — command-line interface for the List Service client.

use std::sync::Arc;

use anyhow::{Context, Result};
use patrol_core::PatrolConfig;

mod cmd;

fn print_usage() {
    println!("Usage: patrol-ctl <command>");
    println!();
    println!("Commands");
    println!("  update [LIST...]                 Fetch and apply updates for the given lists");
    println!("  lookup <url> [--lists LIST...]   Check a url against the given lists");
    println!("  status [LIST...]                 Show persisted retry state per list");
    println!();
    println!("Lists default to goog-malware-shavar, goog-phish-shavar when omitted.");
    println!();
    println!("Examples:");
    println!("  patrol-ctl update goog-malware-shavar");
    println!("  patrol-ctl lookup http://example.com/bad --lists goog-malware-shavar");
    println!("  patrol-ctl status");
}

const DEFAULT_LISTS: &[&str] = &["goog-malware-shavar", "goog-phish-shavar"];

fn default_lists() -> Vec<String> {
    DEFAULT_LISTS.iter().map(|s| s.to_string()).collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();

    match arg_refs.as_slice() {
        ["help"] | ["--help"] | ["-h"] | [] => {
            print_usage();
            Ok(())
        }
        ["update", rest @ ..] => {
            let config = Arc::new(PatrolConfig::load().context("failed to load configuration")?);
            let lists = if rest.is_empty() { default_lists() } else { rest.iter().map(|s| s.to_string()).collect() };
            cmd::update::cmd_update(config, lists).await
        }
        ["lookup", url, rest @ ..] => {
            let config = Arc::new(PatrolConfig::load().context("failed to load configuration")?);
            let lists = parse_lists_flag(rest).unwrap_or_else(default_lists);
            cmd::lookup::cmd_lookup(config, url, lists).await
        }
        ["status", rest @ ..] => {
            let config = Arc::new(PatrolConfig::load().context("failed to load configuration")?);
            let lists = if rest.is_empty() { default_lists() } else { rest.iter().map(|s| s.to_string()).collect() };
            cmd::status::cmd_status(config, lists).await
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

/// Parse a trailing `--lists a,b,c` flag, if present.
fn parse_lists_flag(rest: &[&str]) -> Option<Vec<String>> {
    let idx = rest.iter().position(|s| *s == "--lists")?;
    let value = rest.get(idx + 1)?;
    Some(value.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
}
