//! gmailpush-relay - run one Pub/Sub push through the sync pipeline
//!
//! Reads the push body from the given file, or stdin when none is given,
//! and prints the matching messages as JSON.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use pushsync::{MessageQuery, PushPayload, PushSync, ServiceConfig, UserCredentials};

#[derive(Parser, Debug)]
#[command(name = "gmailpush-relay")]
#[command(about = "Run one Gmail Pub/Sub push through the history sync and print the matching messages")]
struct Args {
    /// Service config file; the config directory's gmailpush.json when unset
    #[arg(long)]
    config: Option<PathBuf>,

    /// Message query file (labels and change kinds)
    #[arg(long)]
    query: Option<PathBuf>,

    /// Fill in attachment bytes for matching messages
    #[arg(long)]
    fetch_attachments: bool,

    /// Push body file; stdin when omitted
    input: Option<PathBuf>,
}

fn read_push_body(input: Option<&PathBuf>) -> Result<String> {
    match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read push body from {}", path.display())),
        None => {
            let mut body = String::new();
            std::io::stdin()
                .read_to_string(&mut body)
                .context("Failed to read push body from stdin")?;
            Ok(body)
        }
    }
}

fn run(args: Args) -> Result<()> {
    let service_config = ServiceConfig::load_from(args.config.as_deref())?;
    if let Some(topic) = &service_config.pub_sub_topic {
        info!("Relaying pushes from {}", topic);
    }

    let query = match &args.query {
        Some(path) => config::load_json_file(path)?,
        None => MessageQuery::default(),
    };

    let payload = PushPayload::from_json(&read_push_body(args.input.as_ref())?)?;
    let credentials = UserCredentials::load()?;
    let sync = PushSync::from_config(&service_config)?;

    let report = sync.sync_push(&payload, &credentials, &query, args.fetch_attachments)?;
    println!("{}", serde_json::to_string_pretty(&report.messages)?);
    Ok(())
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    if let Err(e) = run(args) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
