//! librus-auth - log in to the Librus portal and keep Synergia tokens fresh.
//!
//! Records are stored per Synergia login in the cache directory; the portal
//! password can be kept in the OS keychain so a revoked refresh token can be
//! recovered from by logging in again.

mod config;

use std::io;

use anyhow::{Context, Result};
use chrono::Local;
use librus_auth_core::{
    AuthError, Authenticator, CredentialRecord, CredentialStore, ExpiryCheck, PortalConfig,
    RecordStore, SessionManager, UserAgent,
};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;

const USAGE: &str = "\
Usage: librus-auth <command> [args]

Commands:
  login [email]     Log in and store a record per linked Synergia account
  list              Show stored records
  check <login>     Check root token expiry and access token liveness
  refresh <login>   Mint a new access token (refreshing the root token if needed)
  token <login>     Print a working access token, re-authenticating if necessary
  logout <login>    Delete the stored record

Environment:
  LIBRUS_EMAIL, LIBRUS_PASSWORD, LIBRUS_USER_AGENT (xiaomi, googlebot or a literal string)
  RUST_LOG controls log verbosity (default: warn)";

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // File logging is best effort; stderr always works
    let (file_layer, guard) = match Config::log_dir() {
        Ok(dir) if std::fs::create_dir_all(&dir).is_ok() => {
            let appender = tracing_appender::rolling::daily(dir, "librus-auth.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("help");
    let arg = args.get(1).map(String::as_str);

    let mut config = Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        Config::default()
    });
    if let Ok(agent) = std::env::var("LIBRUS_USER_AGENT") {
        config.user_agent = UserAgent::from_name(&agent);
    }
    let portal = PortalConfig::default().with_user_agent(config.user_agent.clone());
    let store = RecordStore::new(Config::records_dir()?);

    match command {
        "login" => login(&mut config, &portal, &store, arg).await,
        "list" => list(&store),
        "check" => check(&portal, &store, require_login(arg)?).await,
        "refresh" => refresh(&portal, &store, require_login(arg)?).await,
        "token" => token(&mut config, &portal, &store, require_login(arg)?).await,
        "logout" => logout(&store, require_login(arg)?),
        "help" | "-h" | "--help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }
}

fn require_login(arg: Option<&str>) -> Result<&str> {
    arg.ok_or_else(|| anyhow::anyhow!("Missing <login> argument\n\n{}", USAGE))
}

fn load_record(store: &RecordStore, login: &str) -> Result<CredentialRecord> {
    store
        .load(login)?
        .ok_or_else(|| anyhow::anyhow!("No stored record for {}. Run `librus-auth login` first.", login))
}

fn resolve_email(config: &Config, arg: Option<&str>) -> Result<String> {
    if let Some(email) = arg {
        return Ok(email.to_string());
    }
    if let Ok(email) = std::env::var("LIBRUS_EMAIL") {
        return Ok(email);
    }
    config
        .last_email
        .clone()
        .ok_or_else(|| anyhow::anyhow!("No e-mail given and none remembered"))
}

fn resolve_password(keychain: &CredentialStore, email: &str) -> Result<String> {
    if let Ok(password) = std::env::var("LIBRUS_PASSWORD") {
        return Ok(password);
    }
    if keychain.has_credentials(email) {
        return keychain.get_password(email);
    }
    Ok(rpassword::prompt_password("Password: ")?)
}

/// Full portal login; saves every returned record and remembers the e-mail.
async fn authenticate_and_save(
    config: &mut Config,
    portal: &PortalConfig,
    store: &RecordStore,
    email: &str,
    password: &str,
) -> Result<Vec<CredentialRecord>> {
    let records = Authenticator::new(portal.clone())?
        .authenticate(email, password)
        .await
        .map_err(|e| match e {
            AuthError::CaptchaRequired(_) => anyhow::anyhow!(
                "The portal requires a captcha. Log in once in a browser, then try again."
            ),
            other => other.into(),
        })?;

    for record in &records {
        store.save(record)?;
    }

    let keychain = CredentialStore::default();
    if let Err(e) = keychain.store(email, password) {
        warn!(error = %e, "Failed to store password in keychain");
    }

    config.last_email = Some(email.to_string());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    info!(accounts = records.len(), "Stored credential records");
    Ok(records)
}

async fn login(config: &mut Config, portal: &PortalConfig, store: &RecordStore, arg: Option<&str>) -> Result<()> {
    let email = resolve_email(config, arg)?;
    let password = resolve_password(&CredentialStore::default(), &email)?;

    let records = authenticate_and_save(config, portal, store, &email, &password).await?;
    for record in &records {
        println!("{}\t{}", record.login(), record);
    }
    Ok(())
}

fn list(store: &RecordStore) -> Result<()> {
    let records = store.list()?;
    if records.is_empty() {
        println!("No stored records in {}", store.dir().display());
        return Ok(());
    }
    for record in records {
        let expiry = record.expires_at().with_timezone(&Local);
        println!(
            "{}\t{}\troot token expires {} ({} min left)",
            record.login(),
            record,
            expiry.format("%Y-%m-%d %H:%M"),
            record.time_until_expiry().num_minutes()
        );
    }
    Ok(())
}

async fn check(portal: &PortalConfig, store: &RecordStore, login: &str) -> Result<()> {
    let record = load_record(store, login)?;
    let sessions = SessionManager::new(portal.clone())?;
    let status = sessions.check_expired(&record, ExpiryCheck::default()).await?;

    let describe = |valid: Option<bool>| match valid {
        Some(true) => "valid",
        Some(false) => "expired",
        None => "not checked",
    };
    println!("root token (clock):  {}", describe(status.clock));
    println!("access token (/Me):  {}", describe(status.query));
    Ok(())
}

async fn refresh(portal: &PortalConfig, store: &RecordStore, login: &str) -> Result<()> {
    let record = load_record(store, login)?;
    let sessions = SessionManager::new(portal.clone())?;

    let updated = sessions
        .revalidate_access(&record)
        .await
        .context("Failed to refresh access token")?;
    store.save(&updated)?;
    println!("Refreshed access token for {}", updated);
    Ok(())
}

async fn token(config: &mut Config, portal: &PortalConfig, store: &RecordStore, login: &str) -> Result<()> {
    let record = load_record(store, login)?;
    let sessions = SessionManager::new(portal.clone())?;

    let record = match sessions.ensure_fresh(&record).await {
        Ok(updated) => updated,
        Err(AuthError::Auth { message, .. }) => {
            // Refresh token revoked; fall back to a full login if we can
            warn!(login = login, reason = %message, "Token refresh failed, logging in again");
            let email = config
                .last_email
                .clone()
                .ok_or_else(|| anyhow::anyhow!("Refresh failed and no e-mail is remembered"))?;
            let keychain = CredentialStore::default();
            if !keychain.has_credentials(&email) {
                anyhow::bail!("Refresh failed; run `librus-auth login` again");
            }
            let password = keychain.get_password(&email)?;
            authenticate_and_save(config, portal, store, &email, &password)
                .await?
                .into_iter()
                .find(|r| r.login() == login)
                .ok_or_else(|| anyhow::anyhow!("{} is no longer linked to {}", login, email))?
        }
        Err(e) => return Err(e.into()),
    };

    store.save(&record)?;
    println!("{}", record.access_token());
    Ok(())
}

fn logout(store: &RecordStore, login: &str) -> Result<()> {
    if store.remove(login)? {
        println!("Removed record for {}", login);
    } else {
        println!("No stored record for {}", login);
    }
    Ok(())
}
