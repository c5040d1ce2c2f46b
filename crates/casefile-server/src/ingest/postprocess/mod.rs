//! Post-processing stages over canonical storage
//!
//! Each stage reads the canonical rows of the job's archive, recomputes its
//! transform from scratch and overwrites the previous result, so running it
//! again over the same rows leaves the same state behind.

pub mod dedupe;
pub mod index;
pub mod thread;

pub use dedupe::DedupeStage;
pub use index::IndexStage;
pub use thread::ThreadStage;

use crate::ingest::framework::{CanonicalStore, StageContext, StageError};
use crate::ingest::records::CanonicalRecord;

/// Canonical rows of the context's archive; a loaded archive always has some
async fn archive_rows(
    canonical: &dyn CanonicalStore,
    ctx: &StageContext,
) -> Result<Vec<CanonicalRecord>, StageError> {
    let rows = canonical
        .records_for_archive(&ctx.source_ref.content_hash)
        .await?;
    if rows.is_empty() {
        return Err(StageError::Structural(format!(
            "no canonical rows for archive {} (stage {} ran before load)",
            ctx.source_ref.content_hash, ctx.stage_name
        )));
    }
    Ok(rows)
}
