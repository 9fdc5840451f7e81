/// Metadata reconciliation: merging fresh observations into the register.
///
/// A session already in the register (same course, same `(date, time,
/// length)`) keeps its download link and local file; only its descriptive
/// fields are refreshed. New sessions get their link resolved through the
/// harvester and start with no local file. Sessions are never removed.
use tracing::{debug, info, warn};

use crate::errors::HarvestError;
use crate::harvest::Harvester;
use crate::matcher::{self, find_session};
use crate::models::{Course, CourseListing, Register, SessionObservation};

/// Policy knobs for reconciliation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Re-resolve the link of every matched session that has not been
    /// downloaded yet, instead of trusting the stored one.
    pub refresh_links: bool,
}

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub courses_observed: usize,
    pub courses_added: usize,
    pub courses_skipped: usize,
    pub sessions_added: usize,
    pub sessions_updated: usize,
    pub sessions_unchanged: usize,
    pub sessions_skipped: usize,
    pub links_resolved: usize,
    pub links_missing: usize,
}

impl ReconcileReport {
    fn absorb(&mut self, other: ReconcileReport) {
        self.courses_observed += other.courses_observed;
        self.courses_added += other.courses_added;
        self.courses_skipped += other.courses_skipped;
        self.sessions_added += other.sessions_added;
        self.sessions_updated += other.sessions_updated;
        self.sessions_unchanged += other.sessions_unchanged;
        self.sessions_skipped += other.sessions_skipped;
        self.links_resolved += other.links_resolved;
        self.links_missing += other.links_missing;
    }
}

/// Harvest every course from `harvester` and reconcile it into `register`.
///
/// Fails only when the course listing itself cannot be read. Courses whose
/// sessions cannot be loaded, and individual rows that cannot be parsed, are
/// logged and skipped; they will be retried from scratch on the next run.
pub async fn harvest_into<H>(
    register: &mut Register,
    harvester: &H,
    options: ReconcileOptions,
) -> Result<ReconcileReport, HarvestError>
where
    H: Harvester + ?Sized,
{
    let listings = harvester.observe_courses().await?;
    info!("{} courses found", listings.len());

    let mut report = ReconcileReport::default();
    let total = listings.len();
    for (i, listing) in listings.iter().enumerate() {
        info!("Requesting course metadata ({}/{}): {}", i + 1, total, listing.name);

        let rows = match harvester.observe_sessions(listing).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Skipping course {}: {}", listing.name, e);
                report.courses_skipped += 1;
                continue;
            }
        };

        let mut observations = Vec::with_capacity(rows.len());
        for row in rows {
            match row {
                Ok(observation) => observations.push(observation),
                Err(e) => {
                    warn!("Skipping session row in {}: {}", listing.name, e);
                    report.sessions_skipped += 1;
                }
            }
        }

        let course_report = reconcile_course(register, listing, observations, harvester, options).await;
        report.absorb(course_report);
    }

    info!(
        "Reconciled {} courses: {} new sessions, {} updated, {} skipped",
        report.courses_observed, report.sessions_added, report.sessions_updated, report.sessions_skipped
    );
    Ok(report)
}

/// Merge one course's observations into `register`.
pub async fn reconcile_course<H>(
    register: &mut Register,
    listing: &CourseListing,
    observations: Vec<SessionObservation>,
    harvester: &H,
    options: ReconcileOptions,
) -> ReconcileReport
where
    H: Harvester + ?Sized,
{
    let mut report = ReconcileReport {
        courses_observed: 1,
        ..ReconcileReport::default()
    };

    let index = match matcher::find_positions(&register.courses, &["courseName"], &[listing.name.as_str()])
        .first()
    {
        Some(&i) => i,
        None => {
            info!("New course: {}", listing.name);
            register.courses.push(Course::new(listing.name.clone()));
            report.courses_added += 1;
            register.courses.len() - 1
        }
    };

    let course = &mut register.courses[index];
    course.code = listing.code.clone();
    course.expected_sessions = listing.expected_sessions;

    for observation in observations {
        match find_session(&course.sessions, &observation.date, &observation.time, &observation.length) {
            Some(i) => {
                let prior = &course.sessions[i];
                let mut link = prior.link.clone();
                let file = prior.file.clone();

                let stale = options.refresh_links && !prior.is_downloaded();
                if link.is_empty() || stale {
                    if let Some(fresh) = resolve_link(harvester, &observation, &course.name, &mut report).await {
                        link = fresh;
                    }
                }

                let merged = observation.into_session(link, file);
                if course.sessions[i] == merged {
                    report.sessions_unchanged += 1;
                } else {
                    debug!("Updated session {} in {}", merged.key(), course.name);
                    course.sessions[i] = merged;
                    report.sessions_updated += 1;
                }
            }
            None => {
                let link = resolve_link(harvester, &observation, &course.name, &mut report)
                    .await
                    .unwrap_or_default();
                let session = observation.into_session(link, String::new());
                debug!("New session {} in {}", session.key(), course.name);
                course.sessions.push(session);
                report.sessions_added += 1;
            }
        }
    }

    report
}

/// Resolve a session's download link, logging instead of failing.
async fn resolve_link<H>(
    harvester: &H,
    observation: &SessionObservation,
    course: &str,
    report: &mut ReconcileReport,
) -> Option<String>
where
    H: Harvester + ?Sized,
{
    let label = format!("{} {} {}", course, observation.date, observation.time);
    if observation.detail_ref.is_empty() {
        warn!("No detail page for {}, link left empty", label);
        report.links_missing += 1;
        return None;
    }

    match harvester.resolve_download_link(&observation.detail_ref).await {
        Ok(link) if !link.is_empty() => {
            report.links_resolved += 1;
            Some(link)
        }
        Ok(_) => {
            warn!("No downloadable file listed for {}", label);
            report.links_missing += 1;
            None
        }
        Err(e) => {
            warn!("Failed to resolve download link for {}: {}", label, e);
            report.links_missing += 1;
            None
        }
    }
}
