//! Login and logout commands

use colored::Colorize;
use dialoguer::{Input, Password, theme::ColorfulTheme};

use crate::cli::CommandContext;
use crate::cli::args::GlobalOptions;
use crate::error::Result;
use crate::output::spinner;

/// Run the login command
pub async fn login(opts: &GlobalOptions, email: Option<String>) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;

    let email = match email {
        Some(email) => email,
        None => Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Email")
            .interact_text()?,
    };
    let password: String = Password::with_theme(&ColorfulTheme::default())
        .with_prompt("Password")
        .interact()?;

    let pb = spinner(ctx.format, "Signing in...");
    let result = ctx.session.sign_in(email.trim(), &password).await;
    pb.finish_and_clear();
    let principal = result?;

    println!(
        "{} Signed in as {} ({})",
        "✓".green(),
        principal.display_name.bold(),
        principal.role.display_name()
    );
    if let Some((column, id)) = principal.scope.filter() {
        println!("  Scope: {} {}", column.trim_end_matches("_id"), id.cyan());
    }
    Ok(())
}

/// Run the logout command
pub async fn logout(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    let pending = ctx.orchestrator.queue().len();

    ctx.session.sign_out().await?;

    let dropped = pending.saturating_sub(ctx.orchestrator.queue().len());
    println!("{} Signed out", "✓".green());
    if dropped > 0 {
        println!(
            "{} Discarded {} queued write(s) from this session",
            "⚠".yellow(),
            dropped
        );
    }
    Ok(())
}
