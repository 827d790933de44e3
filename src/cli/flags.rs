use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "urlhawk", version, about = "URL security verdict engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path (defaults to config/urlhawk.toml when present)
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze one or more URLs and print verdicts
    Scan {
        /// URLs to analyze
        #[arg(required = true)]
        urls: Vec<String>,

        /// Emit raw JSON instead of the readable summary
        #[arg(long)]
        json: bool,
    },
    /// Run the HTTP scan API
    Serve,
}
