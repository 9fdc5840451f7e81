/// Harvester seam: where course and session observations come from.
use async_trait::async_trait;

use crate::errors::HarvestError;
use crate::models::{CourseListing, SessionObservation};

/// Source of course and session observations.
///
/// Implementations may return partial results. A failure for one course
/// or one session row is reported through its own `Err` and never aborts
/// the rest of the harvest.
#[async_trait]
pub trait Harvester: Send + Sync {
    /// Courses the user is enrolled in.
    async fn observe_courses(&self) -> Result<Vec<CourseListing>, HarvestError>;

    /// Session rows for one course. The outer error means the whole course
    /// could not be read; inner errors are individual rows that were skipped.
    async fn observe_sessions(
        &self,
        course: &CourseListing,
    ) -> Result<Vec<Result<SessionObservation, HarvestError>>, HarvestError>;

    /// Follow a session's detail page to its download URL. An empty string
    /// means the page lists no downloadable file.
    async fn resolve_download_link(&self, detail_ref: &str) -> Result<String, HarvestError>;
}
