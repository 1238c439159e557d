//! Payload stores: where a result keeps its calls between construction and
//! emission.
//!
//! Two strategies exist. [`InMemoryStore`] holds the calls as a `Vec`.
//! [`SpooledStore`] writes them to `tmp{task_id}.part` in a spool directory
//! as soon as the result is built and keeps only the path, so the
//! coordinator does not hold every task's payload at once.
//!
//! A spool file is owned by a [`SpoolGuard`]. Dropping an armed guard
//! deletes the file, so a result that is never cleaned up still does not
//! leak it. Handing a result off to another process disarms the sender's
//! guard; the receiver gets a fresh armed one on deserialization.

use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, warn};

use crate::{ResultError, TaskId};

/// Bounds every call record must satisfy to be stored and transferred.
pub trait CallRecord: Serialize + DeserializeOwned + Clone {}

impl<T: Serialize + DeserializeOwned + Clone> CallRecord for T {}

/// Access to the calls a result carries.
pub trait PayloadStore<C: Clone> {
    /// Return the stored calls.
    ///
    /// This is not guaranteed to be cheap. A spooled store re-reads and
    /// decodes its whole file on every call, so read once per pass and
    /// reuse the returned value.
    fn get(&self) -> Result<Cow<'_, [C]>, ResultError>;

    /// Release whatever backs the store. Releasing twice is a no-op.
    fn release(&mut self) -> Result<(), ResultError>;
}

/// How a result should retain its calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StoreStrategy {
    /// Keep calls resident.
    #[default]
    InMemory,
    /// Spool calls to a per-task file under `dir`.
    Spooled { dir: PathBuf },
}

impl StoreStrategy {
    /// Spool into the given directory.
    pub fn spooled(dir: impl Into<PathBuf>) -> Self {
        Self::Spooled { dir: dir.into() }
    }
}

/// Path of the spool file for a task inside `dir`.
pub fn spool_path(dir: &Path, task_id: TaskId) -> PathBuf {
    dir.join(format!("tmp{task_id}.part"))
}

/// Calls held in process memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InMemoryStore<C> {
    calls: Vec<C>,
}

impl<C> InMemoryStore<C> {
    pub fn new(calls: Vec<C>) -> Self {
        Self { calls }
    }
}

impl<C: Clone> PayloadStore<C> for InMemoryStore<C> {
    fn get(&self) -> Result<Cow<'_, [C]>, ResultError> {
        Ok(Cow::Borrowed(&self.calls))
    }

    fn release(&mut self) -> Result<(), ResultError> {
        Ok(())
    }
}

/// Owns a spool file and deletes it when dropped while armed.
#[derive(Debug)]
pub struct SpoolGuard {
    path: PathBuf,
    armed: bool,
}

impl SpoolGuard {
    /// Take ownership of the file at `path`.
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Stop owning the file. Another process has taken over its lifetime.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Delete the file now, reporting any failure.
    pub fn remove(mut self) -> io::Result<()> {
        self.armed = false;
        fs::remove_file(&self.path)
    }
}

impl Drop for SpoolGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed unreleased spool file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove spool file"),
        }
    }
}

/// Calls spooled to a per-task file as JSON lines.
#[derive(Debug)]
pub struct SpooledStore<C> {
    path: PathBuf,
    guard: Option<SpoolGuard>,
    _calls: PhantomData<fn() -> C>,
}

impl<C> SpooledStore<C> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True once `release` has run (or the store arrived released).
    pub fn is_released(&self) -> bool {
        self.guard.is_none()
    }

    pub(crate) fn disarm(&mut self) {
        if let Some(guard) = self.guard.as_mut() {
            guard.disarm();
        }
    }

    fn adopt(path: PathBuf, released: bool) -> Self {
        let guard = (!released).then(|| SpoolGuard::new(path.clone()));
        Self {
            path,
            guard,
            _calls: PhantomData,
        }
    }
}

impl<C: Serialize> SpooledStore<C> {
    /// Write `calls` to the spool file for `task_id` under `dir`.
    ///
    /// An existing file with the same name is overwritten. If writing fails
    /// the partial file is removed before the error is returned.
    pub fn create(dir: &Path, task_id: TaskId, calls: &[C]) -> Result<Self, ResultError> {
        fs::create_dir_all(dir)?;
        let path = spool_path(dir, task_id);
        let file = File::create(&path)?;
        let guard = SpoolGuard::new(path.clone());

        let mut out = BufWriter::new(file);
        for call in calls {
            serde_json::to_writer(&mut out, call)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;

        debug!(task_id = %task_id, path = %path.display(), count = calls.len(), "Spooled calls");
        Ok(Self {
            path,
            guard: Some(guard),
            _calls: PhantomData,
        })
    }
}

impl<C: CallRecord> PayloadStore<C> for SpooledStore<C> {
    fn get(&self) -> Result<Cow<'_, [C]>, ResultError> {
        if self.guard.is_none() {
            return Err(ResultError::PayloadReleased {
                path: self.path.clone(),
            });
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut calls = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let call = serde_json::from_str(&line).map_err(|source| ResultError::SpoolRead {
                path: self.path.clone(),
                line: idx + 1,
                source,
            })?;
            calls.push(call);
        }
        Ok(Cow::Owned(calls))
    }

    fn release(&mut self) -> Result<(), ResultError> {
        match self.guard.take() {
            Some(guard) => {
                guard.remove()?;
                debug!(path = %self.path.display(), "Released spool file");
            }
            None => debug!(path = %self.path.display(), "Spool file already released"),
        }
        Ok(())
    }
}

/// Wire form of a spooled store: the path and nothing else.
#[derive(Serialize)]
struct SpoolRefOut<'a> {
    path: &'a Path,
    released: bool,
}

#[derive(Deserialize)]
struct SpoolRefIn {
    path: PathBuf,
    released: bool,
}

impl<C> Serialize for SpooledStore<C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SpoolRefOut {
            path: &self.path,
            released: self.is_released(),
        }
        .serialize(serializer)
    }
}

impl<'de, C> Deserialize<'de> for SpooledStore<C> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = SpoolRefIn::deserialize(deserializer)?;
        Ok(Self::adopt(wire.path, wire.released))
    }
}

/// The store a result actually carries.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "store", content = "data", rename_all = "snake_case")]
pub enum Payload<C> {
    InMemory(InMemoryStore<C>),
    Spooled(SpooledStore<C>),
}

impl<C: CallRecord> Payload<C> {
    /// Retain `calls` according to `strategy`.
    ///
    /// With a spooled strategy the calls are written out and dropped before
    /// this returns.
    pub fn store(
        strategy: &StoreStrategy,
        task_id: TaskId,
        calls: Vec<C>,
    ) -> Result<Self, ResultError> {
        match strategy {
            StoreStrategy::InMemory => Ok(Self::InMemory(InMemoryStore::new(calls))),
            StoreStrategy::Spooled { dir } => {
                SpooledStore::create(dir, task_id, &calls).map(Self::Spooled)
            }
        }
    }
}

impl<C> Payload<C> {
    pub fn is_spooled(&self) -> bool {
        matches!(self, Self::Spooled(_))
    }

    /// Spool file path, if there is one.
    pub fn spool_path(&self) -> Option<&Path> {
        match self {
            Self::InMemory(_) => None,
            Self::Spooled(store) => Some(store.path()),
        }
    }

    pub(crate) fn disarm(&mut self) {
        if let Self::Spooled(store) = self {
            store.disarm();
        }
    }
}

impl<C: CallRecord> PayloadStore<C> for Payload<C> {
    fn get(&self) -> Result<Cow<'_, [C]>, ResultError> {
        match self {
            Self::InMemory(store) => store.get(),
            Self::Spooled(store) => store.get(),
        }
    }

    fn release(&mut self) -> Result<(), ResultError> {
        match self {
            Self::InMemory(store) => store.release(),
            Self::Spooled(store) => store.release(),
        }
    }
}
