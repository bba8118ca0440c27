//! Recplay CLI

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use recplay::{telemetry, Config, HttpClient, Session, SessionController};

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        usage();
        process::exit(1);
    }

    telemetry::init();

    let command = &args[1];
    let result = match command.as_str() {
        "start" if args.len() >= 3 => start(&args[2], args.get(3)).await,
        "stop" if args.len() >= 3 => stop(&args[2], args.get(3)).await,
        "check" => check(args.get(2)),
        "start" | "stop" => {
            eprintln!("Usage: recplay {command} <{}> [config]", argument_name(command));
            process::exit(1);
        }
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'recplay' for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn usage() {
    eprintln!("Recplay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: recplay <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  start <test-name> [config]     Start a session, print its recording id");
    eprintln!("  stop <recording-id> [config]   Stop a session and save the recording");
    eprintln!("  check [config]                 Show the resolved configuration");
    eprintln!();
    eprintln!("Config is a .toml file or a KEY VALUE env file; defaults to ./.env,");
    eprintln!("then the process environment.");
}

fn argument_name(command: &str) -> &'static str {
    if command == "start" {
        "test-name"
    } else {
        "recording-id"
    }
}

fn load_config(path: Option<&String>) -> anyhow::Result<Config> {
    let config = match path.map(PathBuf::from) {
        Some(path) if is_toml(&path) => Config::from_file(&path)?,
        Some(path) => Config::from_env_file(&path)?,
        None if Path::new(".env").exists() => Config::from_env_file(Path::new(".env"))?,
        None => Config::from_env()?,
    };
    Ok(config)
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "toml")
}

fn controller() -> anyhow::Result<SessionController> {
    Ok(SessionController::new(Arc::new(HttpClient::new()?)))
}

async fn start(test_name: &str, config_path: Option<&String>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let session = Session::for_test(config.proxy.clone(), &config.recording_root, test_name)?;

    controller()?.start(&session).await?;

    println!("{}", session.recording_id().unwrap_or_default());
    Ok(())
}

async fn stop(recording_id: &str, config_path: Option<&String>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let session = Session::resume(config.proxy.clone(), recording_id)?;

    controller()?.stop(&session).await?;

    println!("Stopped {recording_id}");
    Ok(())
}

fn check(config_path: Option<&String>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    println!("Proxy enabled:   {}", config.enabled);
    println!("Mode:            {}", config.proxy.mode);
    println!("Proxy:           {}", config.proxy.base_url());
    println!("Recording root:  {}", config.recording_root.display());
    println!("Routes traffic:  {}", config.routes_through_proxy());
    Ok(())
}
