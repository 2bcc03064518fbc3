//! Registry data commands: list, get, create, update, delete

use colored::Colorize;
use dialoguer::Confirm;
use log::debug;
use serde_json::Value;

use crate::cache::{CacheKey, CacheTtl};
use crate::cli::args::GlobalOptions;
use crate::cli::{CommandContext, ListArgs, WriteArgs};
use crate::client::{DataApi, ListQuery, Mutation, Resource};
use crate::error::Result;
use crate::output::{Formattable, Record, Records, spinner};
use crate::retry::WriteOutcome;
use crate::session::Principal;

/// Build the list query, narrowing to the principal's part of the hierarchy
fn build_query(args: &ListArgs, principal: Option<&Principal>) -> ListQuery {
    let mut query = ListQuery::new();
    for (column, value) in &args.filters {
        query = query.filter(column.clone(), value.clone());
    }

    if !args.all_scopes
        && let Some((column, value)) = principal.and_then(|p| p.scope.filter())
        && args.resource.scope_columns().contains(&column)
        && !args.filters.iter().any(|(c, _)| c == column)
    {
        debug!("Scoping {} to {}={}", args.resource, column, value);
        query = query.filter(column, value);
    }

    if let Some(limit) = args.limit {
        query = query.limit(limit);
    }
    query
}

fn cache_key(resource: Resource, params: &[(String, String)]) -> CacheKey {
    let borrowed: Vec<(&str, &str)> = params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    CacheKey::new(resource.name(), &borrowed)
}

/// Run the list command
pub async fn list(opts: &GlobalOptions, args: &ListArgs) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    ctx.require_session()?;

    let resource = args.resource;
    let query = build_query(args, ctx.session.principal().as_ref());
    let key = cache_key(resource, &query.cache_params());
    let ttl = CacheTtl::for_resource(resource, ctx.config.preferences.cache_ttl());

    let pb = spinner(ctx.format, &format!("Fetching {}...", resource));
    let result: Result<Vec<Value>> = if ctx.no_cache {
        let rows = ctx
            .orchestrator
            .call(&format!("list {}", resource), || ctx.api.list(resource, &query))
            .await;
        if let Ok(ref rows) = rows {
            ctx.orchestrator
                .cache()
                .set(&key, Value::from(rows.clone()), ttl);
        }
        rows
    } else {
        let api = ctx.api.clone();
        ctx.orchestrator
            .read(&key, ttl, move || async move { api.list(resource, &query).await })
            .await
    };
    pb.finish_and_clear();
    let rows = result?;

    debug!("Fetched {} {}", rows.len(), resource);
    Records(&rows).print(ctx.format)?;
    ctx.orchestrator.settle().await;
    Ok(())
}

/// Run the get command
pub async fn get(opts: &GlobalOptions, resource: Resource, id: &str) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    ctx.require_session()?;

    let key = CacheKey::new(resource.name(), &[("id", id)]);
    let ttl = CacheTtl::for_resource(resource, ctx.config.preferences.cache_ttl());

    let row: Value = if ctx.no_cache {
        ctx.orchestrator
            .call(&format!("get {}", resource), || ctx.api.get(resource, id))
            .await?
    } else {
        let api = ctx.api.clone();
        let id = id.to_string();
        ctx.orchestrator
            .read(&key, ttl, move || async move { api.get(resource, &id).await })
            .await?
    };

    Record(&row).print(ctx.format)?;
    ctx.orchestrator.settle().await;
    Ok(())
}

/// Run the create command
pub async fn create(opts: &GlobalOptions, resource: Resource, write: &WriteArgs) -> Result<()> {
    let mutation = Mutation::Create {
        resource,
        data: write.payload()?,
    };
    submit(opts, mutation, !write.no_queue).await
}

/// Run the update command
pub async fn update(
    opts: &GlobalOptions,
    resource: Resource,
    id: &str,
    write: &WriteArgs,
) -> Result<()> {
    let mutation = Mutation::Update {
        resource,
        id: id.to_string(),
        data: write.payload()?,
    };
    submit(opts, mutation, !write.no_queue).await
}

/// Run the delete command
pub async fn delete(
    opts: &GlobalOptions,
    resource: Resource,
    id: &str,
    no_queue: bool,
    yes: bool,
) -> Result<()> {
    if !yes {
        let confirm = Confirm::new()
            .with_prompt(format!("Delete {} {}?", resource, id))
            .default(false)
            .interact()?;
        if !confirm {
            println!("Aborted.");
            return Ok(());
        }
    }

    let mutation = Mutation::Delete {
        resource,
        id: id.to_string(),
    };
    submit(opts, mutation, !no_queue).await
}

async fn submit(opts: &GlobalOptions, mutation: Mutation, queueable: bool) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    ctx.require_session()?;

    let label = mutation.label();
    let pb = spinner(ctx.format, &format!("Sending {}...", label));
    let outcome = ctx
        .orchestrator
        .write(mutation, queueable, ctx.owner())
        .await
        .inspect_err(|_| pb.finish_and_clear())?;
    pb.finish_and_clear();

    match outcome {
        WriteOutcome::Completed(row) => {
            if row.is_null() {
                println!("{} Done: {}", "✓".green(), label);
                Ok(())
            } else {
                Record(&row).print(ctx.format)
            }
        }
        WriteOutcome::Queued(id) => {
            println!(
                "{} Platform unreachable; queued {} as {}",
                "⚠".yellow(),
                label,
                id.bold()
            );
            println!("  → It will be sent on the next online run, or run 'edureg queue drain'");
            Ok(())
        }
    }
}
