//! Query packages and print the events as JSON lines.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example search -- --verbose curl
//! cargo run --example search -- --installed
//! cargo run --example search -- --info busybox
//! ```

use std::env;

use apkdriver::{ApkCommand, ApkHandler};
use futures_util::StreamExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    let command = match (&args.info, args.installed) {
        (Some(package), _) => ApkCommand::info(package),
        (None, true) => ApkCommand::installed(),
        (None, false) => {
            let query = args.terms.join(" ");
            ApkCommand::search((!query.is_empty()).then_some(query.as_str()), args.verbose)
        }
    };

    let handler = ApkHandler::builder().build()?;
    let mut stream = handler.run(&command)?;

    let mut count = 0usize;
    {
        let events = stream.events();
        futures_util::pin_mut!(events);
        while let Some(event) = events.next().await {
            println!("{}", serde_json::to_string(&event?)?);
            count += 1;
        }
    }

    let output = stream.into_output();
    eprintln!("{} events, {:?}", count, output.completion);
    Ok(())
}

/// Simple argument parser (avoiding external dependencies)
struct Args {
    terms: Vec<String>,
    verbose: bool,
    installed: bool,
    info: Option<String>,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut terms = Vec::new();
        let mut verbose = false;
        let mut installed = false;
        let mut info = None;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--verbose" | "-v" => verbose = true,
                "--installed" => installed = true,
                "--info" => {
                    i += 1;
                    if i < args.len() {
                        info = Some(args[i].clone());
                    }
                }
                "--help" => {
                    println!("usage: search [--verbose] [TERMS...] | --installed | --info <PKG>");
                    std::process::exit(0);
                }
                arg if arg.starts_with('-') => {
                    eprintln!("Unknown argument: {}", arg);
                }
                term => terms.push(term.to_string()),
            }
            i += 1;
        }

        Self {
            terms,
            verbose,
            installed,
            info,
        }
    }
}
