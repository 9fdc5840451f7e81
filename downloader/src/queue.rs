/// Work list of pending downloads for one run.
///
/// Built from the register at the start of a run and drained in register
/// order. Each entry keeps its position in the register so completion can be
/// written back to the right session.
use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, info, warn};

use lectern_shared::models::{Register, SessionKey};

/// One session selected for download.
#[derive(Debug, Clone)]
pub struct QueuedDownload {
    pub course_index: usize,
    pub session_index: usize,
    pub course: String,
    pub key: SessionKey,
    pub link: String,
    pub status: TaskState,
    pub local_path: Option<PathBuf>,
    pub error: Option<String>,
    pub started_at: Option<chrono::DateTime<Utc>>,
    pub finished_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Done,
    Failed,
    Cancelled,
}

/// Ordered download queue.
#[derive(Debug, Default)]
pub struct DownloadQueue {
    items: Vec<QueuedDownload>,
}

impl DownloadQueue {
    /// Select every session with a link and no local file, in register order.
    pub fn from_register(register: &Register) -> Self {
        let items: Vec<QueuedDownload> = register
            .courses
            .iter()
            .enumerate()
            .flat_map(|(ci, course)| {
                course
                    .sessions
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.is_pending())
                    .map(move |(si, s)| QueuedDownload {
                        course_index: ci,
                        session_index: si,
                        course: course.name.clone(),
                        key: s.key(),
                        link: s.link.clone(),
                        status: TaskState::Queued,
                        local_path: None,
                        error: None,
                        started_at: None,
                        finished_at: None,
                    })
            })
            .collect();

        info!("{} download(s) queued", items.len());
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&QueuedDownload> {
        self.items.get(position)
    }

    /// Mark an entry running.
    pub fn start(&mut self, position: usize) {
        if let Some(item) = self.items.get_mut(position) {
            item.status = TaskState::Running;
            item.started_at = Some(Utc::now());
            debug!("Download {} started: {} {}", position, item.course, item.key);
        }
    }

    /// Mark an entry done with the file it produced.
    pub fn complete(&mut self, position: usize, path: PathBuf) {
        if let Some(item) = self.items.get_mut(position) {
            item.status = TaskState::Done;
            item.local_path = Some(path);
            item.finished_at = Some(Utc::now());
        }
    }

    pub fn fail(&mut self, position: usize, error: String) {
        if let Some(item) = self.items.get_mut(position) {
            warn!("Download {} failed: {}", position, error);
            item.status = TaskState::Failed;
            item.error = Some(error);
            item.finished_at = Some(Utc::now());
        }
    }

    /// Cancel every entry still queued. Returns how many were cancelled.
    pub fn cancel_remaining(&mut self) -> usize {
        let mut cancelled = 0;
        for item in self.items.iter_mut().filter(|i| i.status == TaskState::Queued) {
            item.status = TaskState::Cancelled;
            cancelled += 1;
        }
        if cancelled > 0 {
            info!("{} queued download(s) cancelled", cancelled);
        }
        cancelled
    }

    pub fn stats(&self) -> QueueStats {
        let count = |state: TaskState| self.items.iter().filter(|i| i.status == state).count();
        QueueStats {
            total: self.items.len(),
            queued: count(TaskState::Queued),
            running: count(TaskState::Running),
            completed: count(TaskState::Done),
            failed: count(TaskState::Failed),
            cancelled: count(TaskState::Cancelled),
        }
    }
}

/// Queue statistics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub total: usize,
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}
