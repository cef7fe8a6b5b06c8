use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use super::types::{FileId, UploadState, UploadStatus};

/// 单个文件的上传记录，对外只提供快照
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FileRecord {
    pub id: FileId,
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    /// 本地预览地址
    pub preview_url: String,
    #[serde(flatten)]
    pub status: UploadStatus,
    /// 已开始的上传次数
    pub attempts: u32,
    /// 最近一次成功上传的对象 key
    pub storage_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FileRecord {
    pub(crate) fn new(
        name: impl Into<String>,
        size_bytes: u64,
        mime_type: impl Into<String>,
        preview_url: impl Into<String>,
    ) -> Self {
        Self {
            id: FileId::new(),
            name: name.into(),
            size_bytes,
            mime_type: mime_type.into(),
            preview_url: preview_url.into(),
            status: UploadStatus::Pending,
            attempts: 0,
            storage_key: None,
            created_at: Utc::now(),
        }
    }

    pub fn state(&self) -> UploadState {
        self.status.state()
    }

    /// Pending / Error 为 0，Success 为 100
    pub fn progress_percent(&self) -> u8 {
        match &self.status {
            UploadStatus::Uploading { progress_percent } => *progress_percent,
            UploadStatus::Success { .. } => 100,
            UploadStatus::Pending | UploadStatus::Error { .. } => 0,
        }
    }

    pub fn remote_url(&self) -> Option<&str> {
        match &self.status {
            UploadStatus::Success { remote_url } => Some(remote_url),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            UploadStatus::Error { error_message } => Some(error_message),
            _ => None,
        }
    }

    /// 不再有进行中的上传
    pub fn is_settled(&self) -> bool {
        matches!(self.state(), UploadState::Success | UploadState::Error)
    }

    pub fn can_retry(&self) -> bool {
        self.state() == UploadState::Error
    }

    /// 开始新一轮上传，进度归零，返回本次尝试编号
    pub(crate) fn begin_attempt(&mut self) -> Option<u32> {
        if !self.state().can_transition_to(UploadState::Uploading) {
            return None;
        }

        self.attempts += 1;
        self.status = UploadStatus::Uploading { progress_percent: 0 };
        Some(self.attempts)
    }

    /// 只接受更大的进度，返回是否有变化
    pub(crate) fn update_progress(&mut self, percent: u8) -> bool {
        match &mut self.status {
            UploadStatus::Uploading { progress_percent } if percent.min(100) > *progress_percent => {
                *progress_percent = percent.min(100);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn mark_success(&mut self, remote_url: String, key: String) -> bool {
        if !self.state().can_transition_to(UploadState::Success) {
            return false;
        }

        self.status = UploadStatus::Success { remote_url };
        self.storage_key = Some(key);
        true
    }

    pub(crate) fn mark_failed(&mut self, error_message: String) -> bool {
        if !self.state().can_transition_to(UploadState::Error) {
            return false;
        }

        self.status = UploadStatus::Error { error_message };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> FileRecord {
        FileRecord::new("a.png", 1000, "image/png", "preview://a")
    }

    #[test]
    fn test_new_record_is_pending() {
        let record = record();

        assert_eq!(record.state(), UploadState::Pending);
        assert_eq!(record.progress_percent(), 0);
        assert_eq!(record.attempts, 0);
        assert!(record.remote_url().is_none());
        assert!(record.error_message().is_none());
    }

    #[test]
    fn test_progress_never_regresses() {
        let mut record = record();
        assert_eq!(record.begin_attempt(), Some(1));

        assert!(record.update_progress(30));
        assert!(!record.update_progress(20));
        assert!(!record.update_progress(30));
        assert!(record.update_progress(250));
        assert_eq!(record.progress_percent(), 100);
    }

    #[test]
    fn test_failure_resets_progress_and_allows_retry() {
        let mut record = record();
        record.begin_attempt();
        record.update_progress(40);

        assert!(record.mark_failed("connection reset".to_string()));
        assert_eq!(record.progress_percent(), 0);
        assert_eq!(record.error_message(), Some("connection reset"));
        assert!(record.remote_url().is_none());
        assert!(record.can_retry());

        assert_eq!(record.begin_attempt(), Some(2));
        assert_eq!(record.progress_percent(), 0);
        assert!(record.error_message().is_none());
    }

    #[test]
    fn test_success_is_terminal() {
        let mut record = record();
        record.begin_attempt();

        assert!(record.mark_success("https://b.s3.amazonaws.com/k".to_string(), "k".to_string()));
        assert_eq!(record.progress_percent(), 100);
        assert_eq!(record.remote_url(), Some("https://b.s3.amazonaws.com/k"));
        assert!(record.error_message().is_none());

        assert_eq!(record.begin_attempt(), None);
        assert!(!record.mark_failed("late".to_string()));
        assert!(!record.update_progress(10));
        assert_eq!(record.state(), UploadState::Success);
    }

    #[test]
    fn test_pending_cannot_finish_without_upload() {
        let mut record = record();

        assert!(!record.mark_success("u".to_string(), "k".to_string()));
        assert!(!record.mark_failed("e".to_string()));
        assert_eq!(record.state(), UploadState::Pending);
    }
}
