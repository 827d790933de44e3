use anyhow::{Context, Result};

use crate::cli::flags::{Cli, Command};
use crate::config::{load_config, AppConfig};
use crate::core::types::{ScanResult, ScanStatus};
use crate::pipeline::analyzer::Analyzer;
use crate::server;

pub fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let runtime = tokio::runtime::Runtime::new().context("tokio runtime")?;

    match cli.command {
        Command::Scan { urls, json } => runtime.block_on(run_scan(config, urls, json)),
        Command::Serve => runtime.block_on(async {
            server::serve(config).await?;
            Ok(())
        }),
    }
}

async fn run_scan(config: AppConfig, urls: Vec<String>, json: bool) -> Result<()> {
    let analyzer = Analyzer::from_config(config)?;
    let mut results = Vec::new();

    for url in &urls {
        match analyzer.scan(url).await {
            Ok(result) => {
                if json {
                    results.push(result);
                } else {
                    print_verdict(url, &result);
                }
            }
            Err(e) => {
                if json {
                    eprintln!("{}: {}", url, e);
                } else {
                    println!("URL: {}\n  error: {}\n", url, e);
                }
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }
    Ok(())
}

fn print_verdict(url: &str, result: &ScanResult) {
    let label = match result.status {
        ScanStatus::Safe => "SAFE",
        ScanStatus::Suspicious => "SUSPICIOUS",
        ScanStatus::Danger => "DANGER",
    };
    println!("URL: {}", url);
    println!("  Verdict: {} ({:.0}% risk)", label, result.risk_score * 100.0);
    println!("  {}", result.message);
    if !result.details.risk_factors.is_empty() {
        println!("  Risk factors:");
        for factor in &result.details.risk_factors {
            match &factor.evidence {
                Some(evidence) => {
                    println!("    - [{:?}] {} ({})", factor.severity, factor.message, evidence)
                }
                None => println!("    - [{:?}] {}", factor.severity, factor.message),
            }
        }
    }
    if let Some(final_url) = &result.details.network.final_url {
        if final_url.as_str() != url {
            println!("  Final URL: {}", final_url);
        }
    }
    println!();
}
