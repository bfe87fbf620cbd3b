//! Formula hot reload.
//!
//! A [`ReloadWatcher`] is consulted by the render loop once per buffer. It
//! hands back a freshly compiled [`Formula`] when the source changed and
//! compiled cleanly; anything else (no change, unreadable file, compile
//! failure) looks like "no change" to the loop.
//!
//! Three strategies are provided:
//!
//! - [`MtimeWatcher`]: compares the formula file's modification time.
//! - [`SentinelWatcher`]: reloads when a control file appears, then deletes it.
//! - [`BackgroundWatcher`]: runs another watcher on a worker thread so file
//!   system calls never compete with sample production.

use crate::error::LoadError;
use crate::formula::Formula;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

/// File name of the default sentinel, placed in the system temp directory.
pub const SENTINEL_FILE_NAME: &str = "bytebeat.reload";

/// Default sentinel path: `<tmp>/bytebeat.reload`.
pub fn default_sentinel_path() -> PathBuf {
    std::env::temp_dir().join(SENTINEL_FILE_NAME)
}

/// Source of replacement formulas, polled between buffers.
pub trait ReloadWatcher {
    /// Called after each buffer with the number of samples just emitted.
    ///
    /// Returns a formula to activate for the next buffer.
    fn poll(&mut self, emitted: usize) -> Option<Formula>;
}

impl<W: ReloadWatcher + ?Sized> ReloadWatcher for Box<W> {
    fn poll(&mut self, emitted: usize) -> Option<Formula> {
        (**self).poll(emitted)
    }
}

/// Fires once every `interval` emitted samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollInterval {
    interval: usize,
    pending: usize,
}

impl PollInterval {
    /// An interval of 0 or 1 checks on every poll, even one that emitted nothing.
    pub fn new(interval: usize) -> Self {
        Self {
            interval: interval.max(1),
            pending: 0,
        }
    }

    /// Samples between checks.
    pub fn interval(&self) -> usize {
        self.interval
    }

    /// Records emitted samples; true when a check is due.
    pub fn tick(&mut self, emitted: usize) -> bool {
        self.pending = self.pending.saturating_add(emitted);
        if self.interval == 1 || self.pending >= self.interval {
            self.pending = 0;
            true
        } else {
            false
        }
    }
}

/// Result of one modification-time check.
#[derive(Debug)]
pub enum ReloadOutcome {
    /// Same modification time, or the file could not be inspected.
    Unchanged,
    /// The file changed and compiled.
    Reloaded {
        /// New formula.
        formula: Formula,
        /// Modification time it was loaded at.
        modified: SystemTime,
    },
    /// The file changed but failed to compile.
    Rejected {
        /// Why it was rejected.
        error: LoadError,
        /// Modification time of the rejected content.
        modified: SystemTime,
    },
}

/// Modification time of `path`.
pub fn modified_time(path: &Path) -> std::io::Result<SystemTime> {
    std::fs::metadata(path)?.modified()
}

/// Reloads `path` if its modification time differs from `last_known`.
///
/// I/O failures are reported as [`ReloadOutcome::Unchanged`] so the next
/// check retries.
pub fn check_and_reload(path: &Path, last_known: Option<SystemTime>) -> ReloadOutcome {
    let modified = match modified_time(path) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "reload check skipped");
            return ReloadOutcome::Unchanged;
        }
    };
    if last_known == Some(modified) {
        return ReloadOutcome::Unchanged;
    }
    match Formula::load(path) {
        Ok(formula) => ReloadOutcome::Reloaded { formula, modified },
        Err(LoadError::Read { source, .. }) => {
            tracing::debug!(path = %path.display(), error = %source, "reload read failed");
            ReloadOutcome::Unchanged
        }
        Err(error) => ReloadOutcome::Rejected { error, modified },
    }
}

/// Reloads when the formula file's modification time changes.
#[derive(Debug)]
pub struct MtimeWatcher {
    path: PathBuf,
    last_modified: Option<SystemTime>,
    interval: PollInterval,
}

impl MtimeWatcher {
    /// Watches `path`, checking every `check_interval` samples.
    ///
    /// The current modification time is taken as the baseline, so the file
    /// as it is now does not trigger a reload.
    pub fn new(path: impl Into<PathBuf>, check_interval: usize) -> Self {
        let path = path.into();
        let last_modified = modified_time(&path).ok();
        Self {
            path,
            last_modified,
            interval: PollInterval::new(check_interval),
        }
    }

    /// Overrides the baseline modification time.
    pub fn with_baseline(mut self, modified: Option<SystemTime>) -> Self {
        self.last_modified = modified;
        self
    }

    /// Watched file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs a check regardless of the poll interval.
    pub fn check_now(&mut self) -> Option<Formula> {
        match check_and_reload(&self.path, self.last_modified) {
            ReloadOutcome::Unchanged => None,
            ReloadOutcome::Reloaded { formula, modified } => {
                tracing::info!(
                    path = %self.path.display(),
                    length = formula.len(),
                    "formula reloaded"
                );
                self.last_modified = Some(modified);
                Some(formula)
            }
            ReloadOutcome::Rejected { error, modified } => {
                tracing::warn!(
                    path = %self.path.display(),
                    "reload rejected, keeping current formula: {error}"
                );
                self.last_modified = Some(modified);
                None
            }
        }
    }
}

impl ReloadWatcher for MtimeWatcher {
    fn poll(&mut self, emitted: usize) -> Option<Formula> {
        if self.interval.tick(emitted) {
            self.check_now()
        } else {
            None
        }
    }
}

/// Reloads when a sentinel file exists, consuming it.
#[derive(Debug)]
pub struct SentinelWatcher {
    formula_path: PathBuf,
    sentinel: PathBuf,
    interval: PollInterval,
}

impl SentinelWatcher {
    /// Reloads `formula_path` whenever `sentinel` appears.
    pub fn new(
        formula_path: impl Into<PathBuf>,
        sentinel: impl Into<PathBuf>,
        check_interval: usize,
    ) -> Self {
        Self {
            formula_path: formula_path.into(),
            sentinel: sentinel.into(),
            interval: PollInterval::new(check_interval),
        }
    }

    /// Sentinel file path.
    pub fn sentinel(&self) -> &Path {
        &self.sentinel
    }

    /// Runs a check regardless of the poll interval.
    pub fn check_now(&mut self) -> Option<Formula> {
        if !self.sentinel.exists() {
            return None;
        }
        if let Err(e) = std::fs::remove_file(&self.sentinel) {
            tracing::debug!(
                path = %self.sentinel.display(),
                error = %e,
                "could not remove sentinel"
            );
        }
        match Formula::load(&self.formula_path) {
            Ok(formula) => {
                tracing::info!(
                    path = %self.formula_path.display(),
                    length = formula.len(),
                    "formula reloaded"
                );
                Some(formula)
            }
            Err(error) => {
                tracing::warn!(
                    path = %self.formula_path.display(),
                    "reload rejected, keeping current formula: {error}"
                );
                None
            }
        }
    }
}

impl ReloadWatcher for SentinelWatcher {
    fn poll(&mut self, emitted: usize) -> Option<Formula> {
        if self.interval.tick(emitted) {
            self.check_now()
        } else {
            None
        }
    }
}

/// Never reloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverReload;

impl ReloadWatcher for NeverReload {
    fn poll(&mut self, _emitted: usize) -> Option<Formula> {
        None
    }
}

/// Runs a watcher on a worker thread and hands formulas over through a
/// single-slot channel. Only the newest pending formula is kept.
///
/// Dropping the watcher stops and joins the worker.
#[derive(Debug)]
pub struct BackgroundWatcher {
    formulas: Receiver<Formula>,
    shutdown: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl BackgroundWatcher {
    /// Spawns a worker that polls `inner` every `period`.
    ///
    /// The inner watcher is polled as if a full check interval had elapsed.
    pub fn spawn<W>(mut inner: W, period: Duration) -> std::io::Result<Self>
    where
        W: ReloadWatcher + Send + 'static,
    {
        let (formula_tx, formula_rx) = bounded::<Formula>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let stale = formula_rx.clone();

        let worker = std::thread::Builder::new()
            .name("bytebeat-reload".into())
            .spawn(move || {
                loop {
                    match shutdown_rx.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let Some(formula) = inner.poll(usize::MAX) else {
                        continue;
                    };
                    if let Err(TrySendError::Full(formula)) = formula_tx.try_send(formula) {
                        // Replace the unconsumed formula with the newer one.
                        let _ = stale.try_recv();
                        let _ = formula_tx.try_send(formula);
                    }
                }
                tracing::debug!("reload worker stopped");
            })?;

        Ok(Self {
            formulas: formula_rx,
            shutdown: Some(shutdown_tx),
            worker: Some(worker),
        })
    }
}

impl ReloadWatcher for BackgroundWatcher {
    fn poll(&mut self, _emitted: usize) -> Option<Formula> {
        let mut latest = None;
        while let Ok(formula) = self.formulas.try_recv() {
            latest = Some(formula);
        }
        latest
    }
}

impl Drop for BackgroundWatcher {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
