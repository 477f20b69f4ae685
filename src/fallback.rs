use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};
use tokio::fs;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct LocalData {
    visitor_count: u64,
}

/// Counter kept on local disk for when the visitor service is unreachable.
///
/// The persisted total outlives the process. The "already visited" flag
/// belongs to this value only, so each `LocalCounter` is one browsing
/// session and bumps the total at most once.
#[derive(Debug)]
pub struct LocalCounter {
    path: PathBuf,
    session_visited: AtomicBool,
}

impl LocalCounter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            session_visited: AtomicBool::new(false),
        }
    }

    pub fn has_visited(&self) -> bool {
        self.session_visited.load(Ordering::SeqCst)
    }

    pub async fn count(&self) -> u64 {
        load_data(&self.path).await.visitor_count
    }

    /// Counts this session once and returns the local total.
    pub async fn register_visit(&self) -> u64 {
        let mut data = load_data(&self.path).await;
        if self.session_visited.swap(true, Ordering::SeqCst) {
            return data.visitor_count;
        }

        data.visitor_count = data.visitor_count.saturating_add(1);
        if let Err(err) = persist_data(&self.path, &data).await {
            warn!("failed to persist local visitor count: {err}");
        }
        data.visitor_count
    }
}

async fn load_data(path: &Path) -> LocalData {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(data) => data,
            Err(err) => {
                error!("failed to parse local counter file: {err}");
                LocalData::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => LocalData::default(),
        Err(err) => {
            error!("failed to read local counter file: {err}");
            LocalData::default()
        }
    }
}

async fn persist_data(path: &Path, data: &LocalData) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let payload = serde_json::to_vec_pretty(data)?;
    fs::write(path, payload).await
}
