use anyhow::{anyhow, Result};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use crate::services::loader::is_json;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEventKind {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
}

/// Which paths under the watched folder belong to the invoice source.
#[derive(Debug, Clone)]
enum SourceFilter {
    SingleFile(OsString),
    JsonFolder,
}

impl SourceFilter {
    fn matches(&self, path: &Path) -> bool {
        match self {
            SourceFilter::SingleFile(name) => path.file_name() == Some(name.as_os_str()),
            SourceFilter::JsonFolder => is_json(path),
        }
    }
}

pub struct WatcherService {
    _watcher: RecommendedWatcher,
}

impl WatcherService {
    /// Watches `source` non-recursively. A file source is watched through its
    /// parent folder so editors that replace the file keep being seen.
    pub fn start(source: &Path, tx: mpsc::Sender<FileEvent>) -> Result<Self> {
        let (folder, filter) = if source.is_dir() {
            (source.to_path_buf(), SourceFilter::JsonFolder)
        } else {
            let name = source
                .file_name()
                .ok_or_else(|| anyhow!("Invalid source path {}", source.display()))?;
            let parent = source
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            (parent.to_path_buf(), SourceFilter::SingleFile(name.to_os_string()))
        };

        if !folder.exists() {
            return Err(anyhow!("Watch folder {} does not exist", folder.display()));
        }

        let watcher = create_watcher(&folder, filter, tx)?;
        Ok(WatcherService { _watcher: watcher })
    }
}

fn create_watcher(
    folder: &Path,
    filter: SourceFilter,
    tx: mpsc::Sender<FileEvent>,
) -> notify::Result<RecommendedWatcher> {
    let mut watcher = recommended_watcher(move |res: notify::Result<Event>| {
        let Ok(event) = res else {
            return;
        };
        for file_event in source_events(event, &filter) {
            if tx.send(file_event).is_err() {
                return;
            }
        }
    })?;

    watcher.watch(folder, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

fn source_events(event: Event, filter: &SourceFilter) -> Vec<FileEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => FileEventKind::Created,
        EventKind::Modify(_) => FileEventKind::Modified,
        EventKind::Remove(_) => FileEventKind::Deleted,
        _ => return Vec::new(),
    };
    event
        .paths
        .into_iter()
        .filter(|path| filter.matches(path))
        .map(|path| FileEvent { path, kind: kind.clone() })
        .collect()
}

const STABLE_SIZE_POLLS: usize = 4;

/// Polls the size of an export that may still be written until two reads
/// agree. Returns the settled size, or `None` when the file vanished or
/// settled empty.
pub fn wait_for_stable_size(path: &Path, interval_ms: u64) -> Option<u64> {
    let interval = Duration::from_millis(interval_ms);
    let mut previous = None;
    for _ in 0..STABLE_SIZE_POLLS {
        std::thread::sleep(interval);
        let size = std::fs::metadata(path).ok()?.len();
        if previous == Some(size) {
            break;
        }
        previous = Some(size);
    }
    previous.filter(|size| *size > 0)
}
