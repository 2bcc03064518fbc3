//! Cache management commands

use crate::cli::OutputFormat;
use crate::cli::args::GlobalOptions;
use crate::cli::context::LocalContext;
use crate::error::Result;
use crate::output::formatters::format_age;
use crate::storage::DurableStore;

/// Show cache status/statistics
pub fn status(opts: &GlobalOptions) -> Result<()> {
    let local = LocalContext::open(opts)?;
    let stats = local.cache().stats();
    let usage = local.store.usage()?;
    let path = local.store.path().display().to_string();

    match local.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "entries": stats.entries,
                "fresh_entries": stats.fresh,
                "expired_entries": stats.expired,
                "max_entries": stats.max_entries,
                "oldest_age_secs": stats.oldest_age.map(|a| a.as_secs()),
                "newest_age_secs": stats.newest_age.map(|a| a.as_secs()),
                "store_entries": usage.entries,
                "store_size_bytes": usage.total_bytes,
                "store_size_human": format_size(usage.total_bytes),
                "path": path,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        _ => {
            println!("Cache Status");
            println!("────────────────────────────────────────");
            println!("Location:       {}", path);
            println!("Fresh entries:  {}", stats.fresh);
            println!("Expired:        {}", stats.expired);
            println!("Capacity:       {}", stats.max_entries);
            println!("Store size:     {}", format_size(usage.total_bytes));

            if let Some(oldest) = stats.oldest_age {
                println!("Oldest entry:   {} ago", format_age(oldest));
            }
            if let Some(newest) = stats.newest_age {
                println!("Newest entry:   {} ago", format_age(newest));
            }
        }
    }

    Ok(())
}

/// Clear all cache entries
pub fn clear(opts: &GlobalOptions) -> Result<()> {
    let local = LocalContext::open(opts)?;
    let removed = local.cache().clear();

    match local.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "entries_removed": removed,
                "success": true,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        _ => {
            if removed > 0 {
                println!("Cleared {} cache entries", removed);
            } else {
                println!("Cache was already empty");
            }
        }
    }

    Ok(())
}

/// Show the durable store path
pub fn path(opts: &GlobalOptions) -> Result<()> {
    let local = LocalContext::open(opts)?;
    println!("{}", local.store.path().display());
    Ok(())
}

/// Format bytes as human-readable size
fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
