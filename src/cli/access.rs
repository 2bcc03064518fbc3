//! Access command: authorization decisions for registry views

use colored::Colorize;

use crate::cli::CommandContext;
use crate::cli::OutputFormat;
use crate::cli::args::GlobalOptions;
use crate::error::{ApiError, Result};
use crate::models::AccessDisplay;
use crate::output::Formattable;
use crate::session::views::{self, VIEWS};
use crate::session::{AuthorizationDecision, Redirect, authorize};

/// Decide one view (or every view) for the current session
pub async fn run(opts: &GlobalOptions, requested: Option<&str>) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    let state = ctx.session.state();

    let rows: Vec<AccessDisplay> = match requested {
        Some(requested) => {
            let view = views::find(requested)
                .ok_or_else(|| ApiError::NotFound(format!("view '{}'", requested)))?;
            vec![AccessDisplay::new(
                view,
                requested,
                authorize(&state, view.required_roles, requested),
            )]
        }
        None => VIEWS
            .iter()
            .map(|view| {
                AccessDisplay::new(view, view.path, authorize(&state, view.required_roles, view.path))
            })
            .collect(),
    };

    match (ctx.format, rows.as_slice()) {
        (OutputFormat::Pretty, [single]) => {
            let mark = match single.outcome {
                AuthorizationDecision::Allowed => "✓".green(),
                AuthorizationDecision::PendingLoad => "○".dimmed(),
                AuthorizationDecision::Denied(_) => "✗".red(),
            };
            println!("{} {}: {}", mark, single.path.bold(), single.decision);
            if let AuthorizationDecision::Denied(Redirect::Login { .. }) = single.outcome {
                println!("  → Run 'edureg login' to sign in");
            }
            Ok(())
        }
        _ => rows.print(ctx.format),
    }
}
