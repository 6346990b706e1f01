//! Result application: persist a processing outcome and forward the
//! derived tags to the search index collaborator.

use std::sync::Arc;

use log::{debug, warn};

use crate::db::{job_repo, Database, DatabaseError};
use crate::error::IndexError;
use crate::protocol::ResultPayload;

/// External search index collaborator. Implementations must merge the
/// automated tags with any pre-existing non-automated ones (never
/// replace wholesale) and must tolerate being called repeatedly with
/// the same tag set.
pub trait SearchIndex: Send + Sync {
    fn merge_tags(&self, media_id: i64, tags: &[String]) -> Result<(), IndexError>;
}

/// Logging stand-in used when no search index is wired up, so the
/// pipeline runs stand-alone.
pub struct NoopSearchIndex;

impl SearchIndex for NoopSearchIndex {
    fn merge_tags(&self, media_id: i64, tags: &[String]) -> Result<(), IndexError> {
        debug!("No search index configured; tags for media {}: {:?}", media_id, tags);
        Ok(())
    }
}

/// Applies submitted results: job state + metadata in the store, then
/// tags to the index.
pub struct ResultApplier {
    db: Database,
    index: Arc<dyn SearchIndex>,
}

impl ResultApplier {
    pub fn new(db: Database, index: Arc<dyn SearchIndex>) -> Self {
        Self { db, index }
    }

    /// Persists the result and, only on success, forwards the tag set.
    /// An index failure is logged but does not undo the terminal job
    /// state — index consistency is best-effort and reconciled by an
    /// external sweep.
    pub fn apply(&self, result: &ResultPayload) -> Result<(), DatabaseError> {
        job_repo::apply_result(
            &self.db,
            result.job_id,
            result.success,
            &result.message,
            result.media_id,
            result.meta.as_ref(),
        )?;

        if result.success {
            if let Err(e) = self.index.merge_tags(result.media_id, &result.tags) {
                warn!(
                    "Search index tag merge failed for media {}: {}",
                    result.media_id, e
                );
            }
        }
        Ok(())
    }
}
