//! Status command implementation

use colored::Colorize;
use serde_json::json;

use crate::cli::OutputFormat;
use crate::cli::args::GlobalOptions;
use crate::cli::context::LocalContext;
use crate::client::AuthSession;
use crate::config::Config;
use crate::error::Result;
use crate::network::{ConnectivityProbe, HttpProbe};
use crate::output::formatters::format_timestamp_local;
use crate::session::SESSION_KEY;
use crate::storage;

/// Run the status command: local state plus a connectivity check
pub async fn run(opts: &GlobalOptions) -> Result<()> {
    let local = LocalContext::open(opts)?;
    let config_path = Config::resolve_path(opts.config_ref())?;
    let config_exists = config_path.exists();
    let api_url = opts.api_url.clone().or_else(|| local.config.api_url.clone());

    let session: Option<AuthSession> =
        storage::load_json(local.store.as_ref(), SESSION_KEY).unwrap_or(None);
    let queued = local.queue().len();
    let cached = local.cache().len();

    let online = match (&api_url, opts.offline) {
        (Some(url), false) => HttpProbe::new(url).check().await,
        _ => Some(false),
    };

    if local.format == OutputFormat::Json {
        let json = json!({
            "config_path": config_path.display().to_string(),
            "config_exists": config_exists,
            "api_url": api_url,
            "data_dir": local.data_dir.display().to_string(),
            "online": online,
            "session": session.as_ref().map(|s| json!({
                "user_id": s.user_id,
                "email": s.email,
                "expires_at": s.expires_at.to_rfc3339(),
            })),
            "queued_writes": queued,
            "cached_responses": cached,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!("{}\n", "EduReg Status".bold());

    if config_exists {
        println!("Config file: {}", config_path.display().to_string().cyan());
    } else {
        println!("{} Configuration not found", "✗".red());
        println!("  → Run 'edureg init' to create one");
    }
    println!("Data dir:    {}", local.data_dir.display().to_string().cyan());
    println!();

    match api_url {
        Some(ref url) => println!("{} Platform: {}", "✓".green(), url),
        None => {
            println!("{} API URL not configured", "✗".red());
            println!("  → Run 'edureg init' or pass --api-url");
        }
    }

    match (opts.offline, online) {
        (true, _) => println!("{} Offline (forced)", "○".dimmed()),
        (false, Some(true)) => println!("{} Online", "✓".green()),
        (false, Some(false)) => println!("{} Offline", "⚠".yellow()),
        (false, None) => println!("{} Connectivity unknown", "○".dimmed()),
    }

    match session {
        Some(ref s) => {
            let who = s.email.as_deref().unwrap_or(&s.user_id);
            if s.expires_within(chrono::Duration::zero()) {
                println!(
                    "{} Signed in as {} (token expired, will refresh on next command)",
                    "⚠".yellow(),
                    who
                );
            } else {
                println!(
                    "{} Signed in as {} (token valid until {})",
                    "✓".green(),
                    who,
                    format_timestamp_local(s.expires_at)
                );
            }
        }
        None => {
            println!("{} Not signed in", "○".dimmed());
            println!("  → Run 'edureg login' to sign in");
        }
    }

    if queued > 0 {
        println!(
            "{} {} queued write(s) waiting for connectivity",
            "⚠".yellow(),
            queued
        );
    } else {
        println!("{} No queued writes", "✓".green());
    }
    println!("{} {} cached response(s)", "○".dimmed(), cached);
    println!();

    Ok(())
}
