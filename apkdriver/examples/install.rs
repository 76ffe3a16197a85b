//! Install (or remove) packages and print each event as it arrives.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example install -- --password secret curl git
//! cargo run --example install -- --remove --cascade --password secret curl
//! ```
//!
//! Without `--password`, sudo must not ask for one (e.g. NOPASSWD or root).

use std::env;
use std::time::Duration;

use apkdriver::{ApkHandler, Event};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.packages.is_empty() {
        eprintln!("Error: at least one package is required");
        std::process::exit(1);
    }

    let mut builder = ApkHandler::builder().max_password_attempts(args.attempts);
    if let Some(password) = &args.password {
        builder = builder.password(password);
    }
    if let Some(secs) = args.timeout {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    if args.no_sudo {
        builder = builder.no_escalation();
    }
    let handler = builder.build()?;

    let mut stream = if args.remove {
        handler.remove(&args.packages, args.cascade)?
    } else {
        handler.add(&args.packages)?
    };
    println!("Running: {} (pid {:?})", stream.command(), stream.child_id());
    println!("{}", "-".repeat(50));

    while let Some(event) = stream.next_event().await? {
        match &event {
            Event::Progress {
                percent, message, ..
            } => println!("[{percent:5.1}%] {message}"),
            Event::Prompt { attempt, .. } => println!("(sent sudo password, attempt {attempt})"),
            Event::Error { message, .. } => eprintln!("error: {message}"),
            other => println!("{other}"),
        }
    }

    let output = stream.into_output();
    println!("{}", "-".repeat(50));
    println!(
        "{:?} (exit code {:?}) in {:?}, {} output lines",
        output.completion,
        output.exit_code,
        output.elapsed,
        output.lines.len()
    );

    if !output.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

/// Simple argument parser (avoiding external dependencies)
struct Args {
    packages: Vec<String>,
    password: Option<String>,
    timeout: Option<u64>,
    attempts: u32,
    remove: bool,
    cascade: bool,
    no_sudo: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut packages = Vec::new();
        let mut password = env::var("APK_SUDO_PASSWORD").ok();
        let mut timeout = None;
        let mut attempts = 3u32;
        let mut remove = false;
        let mut cascade = false;
        let mut no_sudo = false;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--password" | "-P" => {
                    i += 1;
                    if i < args.len() {
                        password = Some(args[i].clone());
                    }
                }
                "--timeout" | "-t" => {
                    i += 1;
                    if i < args.len() {
                        timeout = args[i].parse().ok();
                    }
                }
                "--attempts" | "-a" => {
                    i += 1;
                    if i < args.len() {
                        attempts = args[i].parse().unwrap_or(3);
                    }
                }
                "--remove" | "-r" => remove = true,
                "--cascade" => cascade = true,
                "--no-sudo" => no_sudo = true,
                "--help" => {
                    Self::print_help();
                    std::process::exit(0);
                }
                arg if arg.starts_with('-') => {
                    eprintln!("Unknown argument: {}", arg);
                }
                package => packages.push(package.to_string()),
            }
            i += 1;
        }

        Self {
            packages,
            password,
            timeout,
            attempts,
            remove,
            cascade,
            no_sudo,
        }
    }

    fn print_help() {
        println!(
            r#"apkdriver install example

USAGE:
    cargo run --example install -- [OPTIONS] <PACKAGES>...

OPTIONS:
    -P, --password <PASS>    sudo password [env: APK_SUDO_PASSWORD]
    -t, --timeout <SECS>     Longest silence tolerated from apk [default: none]
    -a, --attempts <N>       Passwords sent before giving up [default: 3]
    -r, --remove             Remove the packages instead of installing them
    --cascade                With --remove, also remove dependent packages
    --no-sudo                Run apk directly (already root)
    --help                   Print this help message
"#
        );
    }
}
