/// The download pass: fetch every session that has a link but no local file.
use std::sync::Arc;

use tracing::{info, warn};

use lectern_shared::errors::{PersistenceError, TransferError};
use lectern_shared::models::SessionKey;
use lectern_shared::register::{PersistMode, RegisterStore};

use crate::cancel::HaltSignal;
use crate::placement::Placement;
use crate::queue::DownloadQueue;
use crate::transfer::Fetcher;

/// A download that did not complete this run.
#[derive(Debug, Clone)]
pub struct FailedDownload {
    pub course: String,
    pub session: String,
    pub message: String,
}

/// Outcome of one download pass.
#[derive(Debug, Clone, Default)]
pub struct DownloadReport {
    pub downloaded: usize,
    pub failed: Vec<FailedDownload>,
    pub cancelled: usize,
    pub halted: bool,
}

pub struct DownloadReconciler {
    fetcher: Arc<dyn Fetcher>,
    placement: Arc<dyn Placement>,
    halt: HaltSignal,
    persist: PersistMode,
}

impl DownloadReconciler {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        placement: Arc<dyn Placement>,
        halt: HaltSignal,
        persist: PersistMode,
    ) -> Self {
        Self {
            fetcher,
            placement,
            halt,
            persist,
        }
    }

    /// Walk the register in order and download pending sessions one at a time.
    ///
    /// A session's `file` is set only after its transfer succeeds. The halt
    /// signal is checked before each transfer starts, never during one. The
    /// register is saved at the end of the pass, halted or not; only a
    /// persistence failure is returned as an error.
    pub async fn run(&self, store: &mut RegisterStore) -> Result<DownloadReport, PersistenceError> {
        let mut queue = DownloadQueue::from_register(store.register());
        let mut report = DownloadReport::default();

        for position in 0..queue.len() {
            if self.halt.is_halting() {
                info!("Halt requested, stopping before the next download");
                report.halted = true;
                report.cancelled = queue.cancel_remaining();
                break;
            }

            let Some(item) = queue.get(position).cloned() else {
                break;
            };
            let (course, session) = {
                let course = &store.register().courses[item.course_index];
                (course, &course.sessions[item.session_index])
            };
            let directory = self.placement.directory_for(course, session);
            info!("Downloading {} {} ({}/{})", item.course, item.key, position + 1, queue.len());
            queue.start(position);

            let result = match tokio::fs::create_dir_all(&directory).await {
                Ok(()) => self.fetcher.fetch(&item.link, &directory).await,
                Err(e) => Err(TransferError::io(&directory, e)),
            };

            match result {
                Ok(path) => {
                    let session = &mut store.register_mut().courses[item.course_index].sessions
                        [item.session_index];
                    session.file = path.to_string_lossy().to_string();
                    queue.complete(position, path);
                    report.downloaded += 1;
                    if self.persist == PersistMode::EachDownload {
                        store.save()?;
                    }
                }
                Err(e) => {
                    if e.is_auth_rejected() {
                        warn!("The portal rejected the download; the login session may have expired");
                    }
                    report.failed.push(failure(&item.course, &item.key, &e));
                    queue.fail(position, e.to_string());
                }
            }
        }

        store.save()?;

        let stats = queue.stats();
        info!(
            "Download pass finished: {} downloaded, {} failed, {} cancelled",
            stats.completed, stats.failed, stats.cancelled
        );
        Ok(report)
    }
}

fn failure(course: &str, key: &SessionKey, error: &TransferError) -> FailedDownload {
    FailedDownload {
        course: course.to_string(),
        session: key.to_string(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use lectern_shared::models::{Course, Register, Session};

    use crate::placement::SemesterPlacement;

    /// Writes a small file per link; fails on links containing "broken";
    /// raises the halt signal on the call numbered `halt_on`.
    struct MockFetcher {
        calls: Mutex<Vec<String>>,
        count: AtomicUsize,
        halt: Option<(usize, HaltSignal)>,
    }

    impl MockFetcher {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                count: AtomicUsize::new(0),
                halt: None,
            }
        }

        fn halting_on(call: usize, signal: HaltSignal) -> Self {
            Self {
                halt: Some((call, signal)),
                ..Self::new()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for MockFetcher {
        async fn fetch(&self, link: &str, destination_dir: &Path) -> Result<PathBuf, TransferError> {
            let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
            self.calls.lock().unwrap().push(link.to_string());
            if let Some((call, signal)) = &self.halt {
                if *call == n {
                    signal.interrupt();
                }
            }
            if link.contains("broken") {
                return Err(TransferError::Status {
                    url: link.to_string(),
                    status: 404,
                });
            }
            let name = link.rsplit('/').next().unwrap_or("file");
            let path = destination_dir.join(name);
            std::fs::write(&path, b"video").unwrap();
            Ok(path)
        }
    }

    fn session(date: &str, link: &str, file: &str) -> Session {
        Session {
            presenter: "Dr A".into(),
            date: date.into(),
            time: "10:00 AM".into(),
            length: "01:00".into(),
            link: link.into(),
            file: file.into(),
            ..Session::default()
        }
    }

    fn store(dir: &Path, sessions: Vec<Session>) -> RegisterStore {
        let mut course = Course::new("Networks 101");
        course.sessions = sessions;
        RegisterStore::with_register(dir.join("register.json"), Register { courses: vec![course] })
    }

    fn reconciler(fetcher: Arc<MockFetcher>, root: &Path, halt: HaltSignal, persist: PersistMode) -> DownloadReconciler {
        DownloadReconciler::new(fetcher, Arc::new(SemesterPlacement::new(root)), halt, persist)
    }

    #[tokio::test]
    async fn test_downloaded_sessions_are_not_fetched() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(
            dir.path(),
            vec![
                session("01/03/24", "http://x/1.mp4", "lectures/1.mp4"),
                session("08/03/24", "http://x/2.mp4", ""),
                session("15/03/24", "", ""),
            ],
        );
        let fetcher = Arc::new(MockFetcher::new());
        let report = reconciler(fetcher.clone(), dir.path(), HaltSignal::new(), PersistMode::EndOfRun)
            .run(&mut store)
            .await
            .unwrap();

        assert_eq!(fetcher.calls(), vec!["http://x/2.mp4".to_string()]);
        assert_eq!(report.downloaded, 1);
        let sessions = &store.register().courses[0].sessions;
        assert_eq!(sessions[0].file, "lectures/1.mp4");
        assert!(sessions[1].file.ends_with("2024/semester1/Networks 101/2.mp4"));
        assert_eq!(sessions[2].file, "");
    }

    #[tokio::test]
    async fn test_second_run_fetches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(dir.path(), vec![session("08/03/24", "http://x/2.mp4", "")]);
        let first = Arc::new(MockFetcher::new());
        reconciler(first, dir.path(), HaltSignal::new(), PersistMode::EachDownload)
            .run(&mut store)
            .await
            .unwrap();

        let mut reloaded = RegisterStore::load(store.path()).unwrap();
        let second = Arc::new(MockFetcher::new());
        let report = reconciler(second.clone(), dir.path(), HaltSignal::new(), PersistMode::EachDownload)
            .run(&mut reloaded)
            .await
            .unwrap();
        assert!(second.calls().is_empty());
        assert_eq!(report.downloaded, 0);
    }

    #[tokio::test]
    async fn test_halt_lets_in_flight_finish() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(
            dir.path(),
            vec![
                session("01/03/24", "http://x/1.mp4", ""),
                session("08/03/24", "http://x/2.mp4", ""),
                session("15/03/24", "http://x/3.mp4", ""),
            ],
        );
        let halt = HaltSignal::new();
        let fetcher = Arc::new(MockFetcher::halting_on(1, halt.clone()));
        let report = reconciler(fetcher.clone(), dir.path(), halt, PersistMode::EndOfRun)
            .run(&mut store)
            .await
            .unwrap();

        assert_eq!(fetcher.calls().len(), 1);
        assert!(report.halted);
        assert_eq!(report.downloaded, 1);
        assert_eq!(report.cancelled, 2);

        let saved = RegisterStore::load(store.path()).unwrap();
        let files: Vec<bool> = saved.register().courses[0]
            .sessions
            .iter()
            .map(|s| s.is_downloaded())
            .collect();
        assert_eq!(files, vec![true, false, false]);
    }

    #[tokio::test]
    async fn test_failure_leaves_session_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(
            dir.path(),
            vec![
                session("01/03/24", "http://x/broken.mp4", ""),
                session("08/03/24", "http://x/2.mp4", ""),
            ],
        );
        let before = store.register().courses[0].sessions[0].clone();
        let fetcher = Arc::new(MockFetcher::new());
        let report = reconciler(fetcher.clone(), dir.path(), HaltSignal::new(), PersistMode::EachDownload)
            .run(&mut store)
            .await
            .unwrap();

        assert_eq!(fetcher.calls().len(), 2);
        assert_eq!(report.downloaded, 1);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].message.contains("404"));
        assert_eq!(store.register().courses[0].sessions[0], before);
        assert!(store.register().courses[0].sessions[1].is_downloaded());
    }

    #[tokio::test]
    async fn test_halted_before_start_saves_unchanged_register() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(dir.path(), vec![session("01/03/24", "http://x/1.mp4", "")]);
        let halt = HaltSignal::new();
        halt.interrupt();
        let fetcher = Arc::new(MockFetcher::new());
        let report = reconciler(fetcher.clone(), dir.path(), halt, PersistMode::EachDownload)
            .run(&mut store)
            .await
            .unwrap();

        assert!(fetcher.calls().is_empty());
        assert!(report.halted);
        assert_eq!(report.cancelled, 1);
        assert!(store.path().exists());
    }
}
