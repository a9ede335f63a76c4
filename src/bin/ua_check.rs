//! User agent check tool
//!
//! Runs the built-in user agent list against each argument (or each stdin line)
//! and prints the verdict. With `--full`, runs the whole classifier using only
//! the user agent, so fingerprint and length checks apply too.

use clap::Parser;
use signal_gateway::domain::BotFingerprint;
use signal_gateway::services::{default_classifier, load_rules_from_file, CompiledRules};
use std::io::BufRead;

#[derive(Parser, Debug)]
#[command(name = "ua-check", about = "Check user agent strings against the bot lists")]
struct Args {
    /// User agent strings to check (reads stdin lines when empty)
    user_agents: Vec<String>,

    /// Run the full classifier instead of the user agent list only
    #[arg(long)]
    full: bool,

    /// JSON file of custom bot rules (used with --full)
    #[arg(long)]
    rules: Option<String>,

    /// Print one JSON object per line
    #[arg(long)]
    json: bool,
}

fn check(ua: &str, args: &Args, rules: &CompiledRules) {
    let classifier = default_classifier();

    if args.full {
        let fp = BotFingerprint { user_agent: Some(ua), ..Default::default() };
        let verdict = classifier.classify_compiled(&fp, rules);
        if args.json {
            let line = serde_json::json!({ "userAgent": ua, "verdict": verdict });
            println!("{}", line);
        } else {
            let label = verdict.bot_type.as_deref().unwrap_or("-");
            let kind = if verdict.is_bot { "BOT" } else { "HUMAN" };
            println!("{:<6} {:<24} [{}] {}", kind, label, verdict.reasons.join(" "), ua);
        }
        return;
    }

    let label = classifier.detect_user_agent(ua);
    if args.json {
        let line = serde_json::json!({ "userAgent": ua, "isBot": label.is_some(), "botType": label });
        println!("{}", line);
    } else {
        match label {
            Some(label) => println!("BOT    {:<24} {}", label, ua),
            None => println!("HUMAN  {:<24} {}", "-", ua),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let rules = match args.rules.as_deref() {
        Some(path) => CompiledRules::new(&load_rules_from_file(path)?),
        None => CompiledRules::default(),
    };

    if !args.user_agents.is_empty() {
        for ua in &args.user_agents {
            check(ua, &args, &rules);
        }
        return Ok(());
    }

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if !line.trim().is_empty() {
            check(line.trim(), &args, &rules);
        }
    }

    Ok(())
}
