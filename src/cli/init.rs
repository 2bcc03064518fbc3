//! Init command implementation

use colored::Colorize;
use dialoguer::{Input, Password, theme::ColorfulTheme};

use crate::cli::args::GlobalOptions;
use crate::config::Config;
use crate::error::Result;
use crate::network::{ConnectivityProbe, HttpProbe};

/// Run the init command
pub async fn run(opts: &GlobalOptions) -> Result<()> {
    let mut config = Config::load_or_default(opts.config_ref())?;

    println!("{}", "Welcome to EduReg!".bold().green());
    println!("Let's point EduReg at your registry platform.\n");

    let default_url = opts
        .api_url
        .clone()
        .or_else(|| config.api_url.clone())
        .unwrap_or_default();
    let api_url: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Registry platform URL")
        .with_initial_text(default_url)
        .interact_text()?;
    let api_url = api_url.trim().trim_end_matches('/').to_string();

    let api_key: String = Password::with_theme(&ColorfulTheme::default())
        .with_prompt("Public API key (leave empty for none)")
        .allow_empty_password(true)
        .interact()?;

    println!("\n{}", "Checking connectivity...".cyan());
    match HttpProbe::new(&api_url).check().await {
        Some(true) => println!("{}", "✓ Platform reachable".green()),
        _ => println!(
            "{}",
            "⚠ Platform not reachable right now; writes will be queued until it is".yellow()
        ),
    }

    config.api_url = Some(api_url);
    config.api_key = (!api_key.trim().is_empty()).then(|| api_key.trim().to_string());
    if let Some(ref dir) = opts.data_dir {
        config.data_dir = Some(dir.into());
    }
    config.save_at(opts.config_ref())?;

    let config_path = Config::resolve_path(opts.config_ref())?;
    println!(
        "\n{} Configuration saved to: {}",
        "✓".green(),
        config_path.display()
    );

    println!("\n{}", "You're all set! Try running:".bold());
    println!("  {} - Sign in", "edureg login".cyan());
    println!("  {} - Show status", "edureg status".cyan());

    Ok(())
}
