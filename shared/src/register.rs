/// Durable register storage.
///
/// The register is always written as a whole: serialized into a sibling
/// temporary file, synced, then renamed over the target. A crash at any
/// point leaves either the previous document or the new one on disk.
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::PersistenceError;
use crate::models::Register;

/// When the download reconciler writes the register back to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistMode {
    /// After every completed download, and once more at the end.
    #[default]
    EachDownload,
    /// Once, after the whole pass.
    EndOfRun,
}

impl std::str::FromStr for PersistMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "each" | "each_download" => Ok(PersistMode::EachDownload),
            "run" | "end_of_run" => Ok(PersistMode::EndOfRun),
            other => Err(format!("unknown persist mode '{}'", other)),
        }
    }
}

/// Owns the in-memory register for the duration of a run.
#[derive(Debug)]
pub struct RegisterStore {
    path: PathBuf,
    register: Register,
}

impl RegisterStore {
    /// Load the register at `path`. A missing file is a first run and yields
    /// an empty register.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let register = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| PersistenceError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No register at {:?}, starting empty", path);
                Register::new()
            }
            Err(source) => return Err(PersistenceError::Read { path, source }),
        };

        info!(
            "Loaded register {:?}: {} courses, {} sessions",
            path,
            register.courses.len(),
            register.session_count()
        );
        Ok(Self { path, register })
    }

    /// Wrap an in-memory register that will be saved to `path`.
    pub fn with_register(path: impl Into<PathBuf>, register: Register) -> Self {
        Self {
            path: path.into(),
            register,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn register(&self) -> &Register {
        &self.register
    }

    pub fn register_mut(&mut self) -> &mut Register {
        &mut self.register
    }

    /// Atomically replace the register file with the current contents.
    pub fn save(&self) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec_pretty(&self.register)?;
        write_atomic(&self.path, &bytes)?;
        debug!("Saved register {:?} ({} bytes)", self.path, bytes.len());
        Ok(())
    }
}

/// Write `bytes` to `path` through a synced temporary sibling and a rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let write_err = |source: std::io::Error| PersistenceError::Write {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(write_err)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "register".to_string());
    let tmp_path = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    let result = (|| {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if let Err(e) = result {
        if let Err(cleanup) = fs::remove_file(&tmp_path) {
            if cleanup.kind() != ErrorKind::NotFound {
                warn!("Failed to remove temporary register {:?}: {}", tmp_path, cleanup);
            }
        }
        return Err(write_err(e));
    }

    // Make the rename itself durable where the platform allows it.
    if let Ok(dir) = File::open(&parent) {
        let _ = dir.sync_all();
    }
    Ok(())
}
