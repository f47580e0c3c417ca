//! forestpest - command-line client for the forest pest-control backend.
//!
//! Every command goes through the core gateway, so an expired access token
//! is refreshed transparently and a dead session ends with a login hint.

use std::io;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use forestpest_core::auth::token::remaining_seconds;
use forestpest_core::auth::{KeychainBackend, SessionFile, TokenClaims};
use forestpest_core::config::CredentialBackend;
use forestpest_core::{
    ApiError, ApiRequest, Config, CredentialStore, ForestApi, Gateway, ReqwestTransport,
    SessionListener, TokenStore,
};
use serde_json::Value;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_DIR_VAR: &str = "FORESTPEST_LOG_DIR";
const PASSWORD_VAR: &str = "FORESTPEST_PASSWORD";

const USAGE: &str = "\
Usage: forestpest <command> [args]

Commands:
  login <username> [--remember]   Log in (password from FORESTPEST_PASSWORD or prompt)
  logout                          End the session
  whoami                          Show the logged-in user's profile
  status                          Show environment and session state
  health                          Check the backend is reachable
  get <path> [key=value ...]      GET a path relative to the API base URL
  delete <path>                   DELETE a path
  post <path> <json>              POST a JSON body
  put <path> <json>               PUT a JSON body";

/// Initialize the tracing subscriber.
///
/// Logs go to stderr unless `FORESTPEST_LOG_DIR` names a directory, in which
/// case they are written to a daily rolling file there. Use `RUST_LOG` to
/// control the level (default `warn`).
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match std::env::var(LOG_DIR_VAR).ok().filter(|d| !d.is_empty()) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "forestpest.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

/// Prints a login hint when the session can no longer be renewed.
struct CliListener;

impl SessionListener for CliListener {
    fn session_invalidated(&self, reason: &ApiError) {
        warn!(error = %reason, "Session invalidated");
        eprintln!("Session expired ({}). Run `forestpest login <username>` again.", reason.user_message());
    }
}

fn open_store(config: &Config) -> Result<TokenStore> {
    let store = match config.credential_backend {
        CredentialBackend::File => TokenStore::open(SessionFile::new(config.cache_dir()?)),
        CredentialBackend::Keychain => TokenStore::open(KeychainBackend::new("session")),
    };
    Ok(store)
}

fn read_password(username: &str) -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_VAR) {
        return Ok(password);
    }
    rpassword::prompt_password(format!("Password for {username}: "))
        .context("Failed to read password")
}

fn parse_body(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).context("Request body is not valid JSON")
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Split trailing `key=value` arguments into query pairs.
fn parse_query(args: &[String]) -> Result<Vec<(String, String)>> {
    args.iter()
        .map(|arg| {
            arg.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| anyhow::anyhow!("Expected key=value, got '{arg}'"))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{USAGE}");
        return Ok(());
    };
    if matches!(command, "-h" | "--help" | "help") {
        println!("{USAGE}");
        return Ok(());
    }

    let mut config = Config::load()?;
    let gateway_config = config.gateway_config();
    info!(environment = ?config.environment, base_url = %gateway_config.base_url, "forestpest starting");

    let store = Arc::new(open_store(&config)?);
    let transport = Arc::new(ReqwestTransport::new(gateway_config.timeout)?);
    let gateway = Gateway::new(gateway_config, transport, store.clone(), Arc::new(CliListener));

    let result = run(&gateway, &store, &mut config, command, &args[1..]).await;

    if let Err(ref e) = result {
        if let Some(api_err) = e.downcast_ref::<ApiError>() {
            if api_err.requires_login() && !matches!(command, "login") {
                eprintln!("Not logged in. Run `forestpest login <username>`.");
            }
        }
    }
    result
}

async fn run(
    gateway: &Gateway,
    store: &TokenStore,
    config: &mut Config,
    command: &str,
    args: &[String],
) -> Result<()> {
    match (command, args) {
        ("login", [username, rest @ ..]) => {
            let remember = rest.iter().any(|a| a == "--remember");
            let password = read_password(username)?;
            let user = gateway.login(username, &password, remember).await?;
            config.last_username = Some(username.clone());
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
            println!("Logged in as {username}");
            print_json(&user)
        }
        ("logout", []) => {
            gateway.logout().await;
            println!("Logged out");
            Ok(())
        }
        ("whoami", []) => print_json(&ForestApi::new(gateway.clone()).profile().await?),
        ("status", []) => {
            println!("Environment: {:?}", config.environment);
            println!("Base URL:    {}", gateway.config().base_url);
            match store.access_token() {
                Some(token) => {
                    let user = config.last_username.as_deref().unwrap_or("unknown user");
                    println!("Session:     logged in ({user})");
                    let has_expiry = TokenClaims::decode(&token).and_then(|c| c.exp).is_some();
                    match remaining_seconds(&token) {
                        Some(secs) => {
                            println!("Token:       expires in {}m {}s", secs / 60, secs % 60)
                        }
                        None if has_expiry => {
                            println!("Token:       expired, will refresh on next request")
                        }
                        None => println!("Token:       no expiry information"),
                    }
                    println!("Remembered:  {}", store.remember());
                }
                None => println!("Session:     not logged in"),
            }
            Ok(())
        }
        ("health", []) => print_json(&ForestApi::new(gateway.clone()).health().await?),
        ("get", [path, query @ ..]) => {
            let request = parse_query(query)?
                .into_iter()
                .fold(ApiRequest::get(path.as_str()), |req, (k, v)| req.query(k, v));
            print_json(&gateway.send(request).await?)
        }
        ("delete", [path]) => print_json(&gateway.delete(path).await?),
        ("post", [path, body]) => print_json(&gateway.post(path, parse_body(body)?).await?),
        ("put", [path, body]) => print_json(&gateway.put(path, parse_body(body)?).await?),
        _ => {
            eprintln!("{USAGE}");
            bail!("Unrecognized command: {command} {}", args.join(" "));
        }
    }
}
