use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;
use super::types::FileSource;

type Entries = Arc<Mutex<HashMap<String, FileSource>>>;

fn lock(entries: &Entries) -> MutexGuard<'_, HashMap<String, FileSource>> {
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 本地预览地址注册表
///
/// 每个被接收的文件拿到一个 `preview://` 地址，界面可以用它解析出文件内容。
/// 地址由 [`PreviewHandle`] 持有，释放后不可再解析。
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    entries: Entries,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, source: &FileSource) -> PreviewHandle {
        let url = format!("preview://{}", Uuid::new_v4());
        lock(&self.entries).insert(url.clone(), source.clone());

        PreviewHandle {
            url,
            entries: self.entries.clone(),
            released: false,
        }
    }

    pub fn resolve(&self, url: &str) -> Option<FileSource> {
        lock(&self.entries).get(url).cloned()
    }

    /// 尚未释放的预览数
    pub fn live_count(&self) -> usize {
        lock(&self.entries).len()
    }
}

/// 预览地址的所有权，显式 `release` 或 drop 时释放，且只释放一次
#[derive(Debug)]
pub struct PreviewHandle {
    url: String,
    entries: Entries,
    released: bool,
}

impl PreviewHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// 返回注册表里是否确实删除了该地址
    pub fn release(mut self) -> bool {
        self.release_inner()
    }

    fn release_inner(&mut self) -> bool {
        if self.released {
            return false;
        }

        self.released = true;
        let removed = lock(&self.entries).remove(&self.url).is_some();
        tracing::trace!(preview_url = %self.url, removed, "preview released");
        removed
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.release_inner();
    }
}
