//! Cache administration commands

use std::path::Path;

use anyhow::Context;

use super::{print_response, Command, EntriesArgs};
use crate::domain::semantic_cache::CacheSettingsUpdate;
use crate::infrastructure::services::{AdminResponse, CacheAdmin};
use crate::RagEngine;

/// Run one admin command and print its response
///
/// Returns `false` when the operation failed.
pub async fn run(engine: &RagEngine, command: &Command) -> anyhow::Result<bool> {
    let response = execute(engine.admin(), command).await?;
    print_response(&response)?;

    Ok(response.success)
}

async fn execute(admin: &CacheAdmin, command: &Command) -> anyhow::Result<AdminResponse> {
    let response = match command {
        Command::Stats => AdminResponse::ok("Cache statistics", admin.stats().await),
        Command::Health => AdminResponse::ok("Cache health", admin.health().await),
        Command::Entries(EntriesArgs {
            query,
            limit,
            include_expired,
        }) => AdminResponse::ok(
            "Cache entries",
            admin
                .search_entries(query.as_deref(), *limit, *include_expired)
                .await,
        ),
        Command::Entry { hash } => {
            AdminResponse::from_result("Cache entry", admin.entry_detail(hash).await)
        }
        Command::Delete { hash } => AdminResponse::from_result(
            format!("Cache entry {} deleted", hash),
            admin.delete_entry(hash).await,
        ),
        Command::Cleanup => match admin.cleanup_expired().await {
            Ok(removed) => AdminResponse::ok(
                format!("Removed {} expired entries", removed),
                serde_json::json!({ "removed_count": removed }),
            ),
            Err(e) => AdminResponse::failure(e.to_string()),
        },
        Command::Evict => match admin.evict_lru().await {
            Ok(evicted) => AdminResponse::ok(
                format!("Evicted {} entries", evicted),
                serde_json::json!({ "evicted_count": evicted }),
            ),
            Err(e) => AdminResponse::failure(e.to_string()),
        },
        Command::Optimize => AdminResponse::from_result("Cache optimized", admin.optimize().await),
        Command::Clear => AdminResponse::from_result("All cache entries cleared", admin.clear_all().await),
        Command::Export(args) => export(admin, &args.file, args.include_embeddings).await?,
        Command::Import(args) => import(admin, &args.file, args.overwrite).await?,
        Command::Backup { dir } => {
            AdminResponse::from_result("Cache backed up", admin.backup(dir).await)
        }
        Command::ConfigUpdate(args) => AdminResponse::from_result(
            "Cache settings updated",
            admin
                .update_config(&CacheSettingsUpdate::from(args))
                .await,
        ),
        Command::Probe(args) => AdminResponse::from_result(
            "Cache lookup",
            admin.probe(&args.query, args.threshold).await,
        ),
        Command::Serve | Command::Ingest(_) | Command::Query(_) => {
            anyhow::bail!("Not an admin command")
        }
    };

    Ok(response)
}

async fn export(
    admin: &CacheAdmin,
    file: &Path,
    include_embeddings: bool,
) -> anyhow::Result<AdminResponse> {
    let export = match admin.export(include_embeddings).await {
        Ok(export) => export,
        Err(e) => return Ok(AdminResponse::failure(e.to_string())),
    };

    let body = serde_json::to_vec_pretty(&export)?;
    tokio::fs::write(file, body)
        .await
        .with_context(|| format!("Failed to write {}", file.display()))?;

    Ok(AdminResponse::ok(
        format!("Exported {} entries to {}", export.entries.len(), file.display()),
        serde_json::json!({
            "file": file,
            "entries": export.entries.len(),
            "include_embeddings": include_embeddings,
        }),
    ))
}

async fn import(admin: &CacheAdmin, file: &Path, overwrite: bool) -> anyhow::Result<AdminResponse> {
    let body = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let document: serde_json::Value = serde_json::from_slice(&body)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;

    Ok(AdminResponse::from_result(
        "Cache import completed",
        admin.import(&document, overwrite).await,
    ))
}
