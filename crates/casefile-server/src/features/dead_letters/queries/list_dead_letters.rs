//! List dead-letter entries, newest first

use casefile_common::types::DeadLetterView;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::ingest::Pipeline;

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 1000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListDeadLettersQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListDeadLettersResponse {
    pub entries: Vec<DeadLetterView>,
    pub count: usize,
}

pub async fn handle(
    pipeline: &Pipeline,
    query: ListDeadLettersQuery,
) -> Result<ListDeadLettersResponse, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 || limit > MAX_LIMIT {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }

    let entries: Vec<DeadLetterView> = pipeline
        .dead_letters()
        .list(limit)
        .await?
        .iter()
        .map(|entry| entry.view())
        .collect();

    Ok(ListDeadLettersResponse {
        count: entries.len(),
        entries,
    })
}
