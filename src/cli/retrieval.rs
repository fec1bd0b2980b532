//! Retrieval commands

use super::{print_response, IngestArgs, QueryArgs};
use crate::infrastructure::retrieval::StaticDocumentFetcher;
use crate::infrastructure::services::AdminResponse;
use crate::RagEngine;

/// Embed documents from a file into the document index
pub async fn ingest(engine: &RagEngine, args: &IngestArgs) -> anyhow::Result<bool> {
    let fetcher = StaticDocumentFetcher::from_file(&args.file).await?;

    let response = AdminResponse::from_result(
        format!("Ingested {}", args.file.display()),
        engine
            .retrieval()
            .ingest(&args.query, fetcher.documents())
            .await,
    );
    print_response(&response)?;

    Ok(response.success)
}

/// Retrieve context for a query, optionally fetching documents from a file
pub async fn query(engine: &RagEngine, args: &QueryArgs) -> anyhow::Result<bool> {
    let fetcher = match &args.documents {
        Some(path) => StaticDocumentFetcher::from_file(path).await?,
        None => StaticDocumentFetcher::default(),
    };

    let response = AdminResponse::from_result(
        "Retrieved context",
        engine.retrieval().retrieve(&args.query, &fetcher).await,
    );
    print_response(&response)?;

    Ok(response.success)
}
