//! Lectern downloader.
//!
//! Walks the register, fetches every lecture with a link and no local
//! file, and records where each one was written.
pub mod cancel;
pub mod placement;
pub mod progress;
pub mod queue;
pub mod reconciler;
pub mod transfer;

pub use cancel::{install_interrupt_handler, HaltSignal, HaltState, FORCED_EXIT_CODE};
pub use placement::{Placement, SemesterPlacement};
pub use reconciler::{DownloadReconciler, DownloadReport};
pub use transfer::{Fetcher, TransferEngine, TransferOptions};
