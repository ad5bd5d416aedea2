//! Auto-reindex loop over the registered project directories.
//!
//! Reads the `autoindex` registry, watches every registered path
//! recursively, and replays `pipeline::run` for a project once its file
//! system goes quiet for the debounce window.

use crate::cancel::CancelToken;
use crate::extract::Registry;
use crate::pipeline;
use crate::store;
use notify::{RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Default debounce window in milliseconds. Changes within this window are
/// batched into one rebuild.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// How often the loop wakes to check deadlines and the shutdown flag.
const TICK: Duration = Duration::from_millis(100);

/// Debounce window, overridable via `DOCTREE_DEBOUNCE_MS`.
fn debounce_window() -> Duration {
    let ms = std::env::var("DOCTREE_DEBOUNCE_MS")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(DEFAULT_DEBOUNCE_MS);
    Duration::from_millis(ms)
}

/// Handle to the running watcher thread. Dropping it stops the thread.
pub struct WatcherHandle {
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    /// Signal the watcher to stop and wait for it.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start watching every directory in the auto-index registry.
pub fn spawn(data_dir: PathBuf, registry: Arc<Registry>) -> anyhow::Result<WatcherHandle> {
    let projects = store::read_auto_index(&data_dir)?;

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |event| {
        let _ = tx.send(event);
    })?;
    for path in projects.keys() {
        match watcher.watch(Path::new(path), RecursiveMode::Recursive) {
            Ok(()) => tracing::info!("watching {path}"),
            Err(err) => tracing::warn!("cannot watch {path}: {err}"),
        }
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let thread = std::thread::spawn({
        let shutdown = Arc::clone(&shutdown);
        move || {
            // The watcher must live as long as the loop.
            let _watcher = watcher;
            run_loop(&shutdown, &rx, &data_dir, &registry, &projects);
        }
    });

    Ok(WatcherHandle {
        shutdown,
        thread: Some(thread),
    })
}

fn run_loop(
    shutdown: &AtomicBool,
    rx: &mpsc::Receiver<notify::Result<notify::Event>>,
    data_dir: &Path,
    registry: &Registry,
    projects: &store::AutoIndex,
) {
    let debounce = debounce_window();
    // Project path -> deadline after which it gets rebuilt.
    let mut dirty: HashMap<String, Instant> = HashMap::new();

    while !shutdown.load(Ordering::SeqCst) {
        match rx.recv_timeout(TICK) {
            Ok(Ok(event)) => {
                for changed in &event.paths {
                    // Rebuild only the first registered parent of the
                    // changed path.
                    if let Some(project_path) = projects
                        .keys()
                        .find(|path| changed.starts_with(Path::new(path)))
                    {
                        dirty.insert(project_path.clone(), Instant::now() + debounce);
                    }
                }
            }
            Ok(Err(err)) => tracing::warn!("watch error: {err}"),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();
        let due: Vec<String> = dirty
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();
        for project_path in due {
            dirty.remove(&project_path);
            let name = &projects[&project_path].name;
            tracing::info!("reindexing {name} ({project_path})");
            if let Err(err) = pipeline::run(
                &CancelToken::new(),
                registry,
                Path::new(&project_path),
                data_dir,
                name,
            ) {
                tracing::error!("reindex of {name} failed: {err}");
            }
        }
    }
}
