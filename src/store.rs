//! Local task book: the trips file and the local half of the idempotency
//! ledger.
//!
//! Tasks are stored one JSON record per line. Loading skips lines that fail
//! to parse, with a warning naming the line, so one malformed record never
//! blocks evaluation of the rest. Saving rewrites the whole book to a temp
//! file and renames it into place, so a crash mid-write leaves the previous
//! book intact. Advisory file locking guards against a concurrent reader
//! seeing a half-written book.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::task::{Task, TripTask};
use crate::watch::logwarn;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Lock error: {0}")]
    Lock(String),
    #[error("No task with id '{0}' in the book")]
    UnknownTask(String),
}

/// RAII guard for file locks - automatically releases lock on drop
struct FileLock {
    #[cfg(unix)]
    file: File,
}

impl FileLock {
    /// Acquire an exclusive lock on a lock file
    #[cfg(unix)]
    fn acquire<P: AsRef<Path>>(lock_path: P) -> Result<Self, StoreError> {
        use std::os::unix::io::AsRawFd;

        if let Some(parent) = lock_path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        // Exclusive lock (LOCK_EX) - blocks until available
        let fd = file.as_raw_fd();
        let ret = unsafe { libc::flock(fd, libc::LOCK_EX) };

        if ret != 0 {
            return Err(StoreError::Lock(format!(
                "Failed to acquire lock on {:?}: {}",
                lock_path.as_ref(),
                std::io::Error::last_os_error()
            )));
        }

        Ok(FileLock { file })
    }

    #[cfg(not(unix))]
    fn acquire<P: AsRef<Path>>(_lock_path: P) -> Result<Self, StoreError> {
        // No flock on non-Unix; the daemon is the single writer anyway.
        Ok(FileLock {})
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let fd = self.file.as_raw_fd();
            unsafe {
                libc::flock(fd, libc::LOCK_UN);
            }
        }
    }
}

/// Get the lock file path for a given book file
fn lock_path_for<P: AsRef<Path>>(book_path: P) -> PathBuf {
    match book_path.as_ref().parent() {
        Some(parent) => parent.join("tasks.lock"),
        None => PathBuf::from("tasks.lock"),
    }
}

/// Default location of the task book inside the data directory
pub fn book_path(dir: &Path) -> PathBuf {
    dir.join("tasks.jsonl")
}

/// The ordered collection of local tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskBook {
    tasks: Vec<Task>,
}

impl TaskBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the book from a JSONL file.
    ///
    /// A missing file is an empty book, not an error - a watcher with no
    /// book simply has nothing to do. Unparsable lines are skipped with a
    /// warning; the rest of the book still loads.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }

        let _lock = FileLock::acquire(lock_path_for(path))?;

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut tasks = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match serde_json::from_str::<Task>(trimmed) {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    logwarn(&format!(
                        "Skipping malformed task record at {}:{}: {}",
                        path.display(),
                        line_num + 1,
                        e
                    ));
                }
            }
        }

        Ok(Self { tasks })
    }

    /// Save the whole book atomically: write to a temp file in the same
    /// directory, fsync, then rename over the original.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), StoreError> {
        let path = path.as_ref();
        let _lock = FileLock::acquire(lock_path_for(path))?;

        let parent = path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent)?;
        let tmp_path = parent.join(format!(".tasks.tmp.{}", std::process::id()));

        let result = (|| -> Result<(), StoreError> {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;

            for task in &self.tasks {
                let json = serde_json::to_string(task)?;
                writeln!(file, "{}", json)?;
            }

            file.flush()?;
            #[cfg(unix)]
            {
                use std::os::unix::io::AsRawFd;
                // fsync so the rename publishes complete data
                let rc = unsafe { libc::fsync(file.as_raw_fd()) };
                if rc != 0 {
                    return Err(StoreError::Io(std::io::Error::last_os_error()));
                }
            }

            Ok(())
        })();

        if result.is_ok() {
            std::fs::rename(&tmp_path, path)?;
        } else {
            let _ = std::fs::remove_file(&tmp_path);
        }

        result
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn trips(&self) -> impl Iterator<Item = &TripTask> {
        self.tasks.iter().filter_map(Task::as_trip)
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id() == id)
    }

    pub fn add(&mut self, task: Task) {
        self.tasks.push(task);
    }

    /// Remove a task by id. Returns true if a task was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id() != id);
        self.tasks.len() != before
    }

    /// Local half of the idempotency ledger: flip the fired flag on one
    /// trip. The caller saves the book afterwards so siblings are rewritten
    /// untouched in the same atomic replace.
    pub fn mark_fired(&mut self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id() == id)
            .ok_or_else(|| StoreError::UnknownTask(id.to_string()))?;

        match task.as_trip_mut() {
            Some(trip) => {
                trip.mark_fired(at);
                Ok(())
            }
            None => Err(StoreError::UnknownTask(id.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
