//! PhishLedger command-line front end.
//!
//! Every subcommand prints a JSON document on stdout. Request failures are
//! printed as `{"error": ..., "status": ...}` and exit non-zero; logs go to
//! stderr.

mod cli;

use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use phishledger_core::{
    Acknowledgement, ClassificationResponse, EmailId, PhishLedger, Settings, credentials, redact,
};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "phishledger=info,phishledger_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Run one command. Startup failures are returned as `Err`; request
/// failures are printed and mapped to an exit code.
async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(Settings::default_path);
    let settings = load_settings(&path).await?;

    let outcome = match cli.command {
        Command::Redact { text } => Ok(json!({ "text": redact(&text) })),
        Command::InitConfig { force } => {
            let message = init_config(&settings, &path, force).await?;
            to_json(Ok(Acknowledgement::new(message)))
        }
        Command::SetApiKey {
            profile,
            clear,
            key,
        } => {
            let profile =
                profile.unwrap_or_else(|| settings.classifier.remote.credential_profile.clone());
            let message = if clear {
                credentials::delete_api_key(&profile)?;
                format!("API key removed for profile {profile}")
            } else {
                credentials::store_api_key(&profile, key.as_deref().unwrap_or_default())?;
                format!("API key stored for profile {profile}")
            };
            to_json(Ok(Acknowledgement::new(message)))
        }
        Command::Classify { email } => {
            let engine = PhishLedger::open(&settings)
                .await
                .context("failed to start classifier")?;
            to_json(
                engine
                    .classify(&email.into())
                    .await
                    .map(ClassificationResponse::from),
            )
        }
        Command::Submit {
            user,
            email,
            date,
            urls,
        } => {
            let engine = open_store(&settings).await?;
            let request = email.into_submission(date, urls);
            to_json(engine.submit(cli::user(user), &request).await)
        }
        Command::Vote {
            user,
            email_id,
            is_phishing,
        } => {
            let engine = open_store(&settings).await?;
            let request = cli::vote_request(email_id, is_phishing);
            to_json(engine.vote(cli::user(user), &request).await)
        }
        Command::Delete { user, email_id } => {
            let engine = open_store(&settings).await?;
            to_json(engine.delete(cli::user(user), EmailId::new(email_id)).await)
        }
        Command::List {
            user,
            mine,
            unvoted,
            domain,
            min_phishing_votes,
        } => {
            let engine = open_store(&settings).await?;
            let filter = cli::list_filter(mine, unvoted, domain, min_phishing_votes);
            to_json(engine.list(cli::user(user), &filter).await)
        }
        Command::Reconcile { email_id } => {
            let engine = open_store(&settings).await?;
            to_json(engine.reconcile(EmailId::new(email_id)).await)
        }
    };

    match outcome {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            debug!("Request failed: {e}");
            let body = json!({ "error": e.public_message(), "status": e.status_code() });
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(if e.is_client_error() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

async fn open_store(settings: &Settings) -> anyhow::Result<PhishLedger> {
    PhishLedger::open_store(settings)
        .await
        .context("failed to open database")
}

fn to_json<T: Serialize>(result: phishledger_core::Result<T>) -> phishledger_core::Result<Value> {
    Ok(serde_json::to_value(result?)?)
}

/// Write `settings` to `path` unless a file is already there. The API key
/// is never written.
async fn init_config(settings: &Settings, path: &Path, force: bool) -> anyhow::Result<String> {
    if !force && tokio::fs::try_exists(path).await? {
        return Ok(format!(
            "Settings already exist at {} (use --force to overwrite)",
            path.display()
        ));
    }
    settings
        .save(path)
        .await
        .with_context(|| format!("failed to write settings to {}", path.display()))?;
    Ok(format!("Settings written to {}", path.display()))
}

/// Load settings from `path`, then apply environment overrides.
async fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let mut settings = Settings::load(path)
        .await
        .with_context(|| format!("failed to read settings from {}", path.display()))?;
    settings.apply_env(|name| std::env::var(name).ok())?;
    settings.validate()?;
    info!(
        "Using database {} with {:?} classifier",
        settings.database_path().display(),
        settings.classifier.backend
    );
    Ok(settings)
}
