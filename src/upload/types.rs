use std::path::PathBuf;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;
use super::errors::Result;
use super::intake::{CandidateFile, IntakeReport};
use super::record::FileRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct FileId(Uuid);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 文件状态（不带数据），用于事件和错误信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    /// 已接收，等待开始
    Pending,
    /// 上传中
    Uploading,
    /// 已完成
    Success,
    /// 失败
    Error,
}

impl UploadState {
    /// 状态机允许的迁移
    pub fn can_transition_to(self, next: UploadState) -> bool {
        use UploadState::*;

        matches!(
            (self, next),
            (Pending, Uploading) | (Uploading, Success) | (Uploading, Error) | (Error, Uploading)
        )
    }
}

/// 文件状态，附带只在该状态下有意义的数据
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading {
        progress_percent: u8,
    },
    Success {
        remote_url: String,
    },
    Error {
        error_message: String,
    },
}

impl UploadStatus {
    pub fn state(&self) -> UploadState {
        match self {
            UploadStatus::Pending => UploadState::Pending,
            UploadStatus::Uploading { .. } => UploadState::Uploading,
            UploadStatus::Success { .. } => UploadState::Success,
            UploadStatus::Error { .. } => UploadState::Error,
        }
    }
}

/// 文件内容来源：磁盘路径或内存
#[derive(Debug, Clone)]
pub enum FileSource {
    Path(PathBuf),
    Memory(Bytes),
}

/// `POST /get-upload-url` 请求体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadUrlRequest {
    pub filename: String,
    pub filetype: String,
}

/// 预签名上传地址，只在一次上传尝试内有效
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadAuthorization {
    pub url: String,
    pub key: String,
}

/// `POST /confirm-upload` 请求体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmUploadRequest {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadConfirmation {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub image_url: String,
}

/// 服务端错误响应 `{ "error": "..." }`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: Option<String>,
}

/// Bucket naming, used to build the public URL of an uploaded object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub region: Option<String>,
    pub public_base_url: Option<String>,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: None,
            public_base_url: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_public_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.public_base_url = Some(base_url.into());
        self
    }

    pub fn public_url(&self, key: &str) -> String {
        let key = key.trim_start_matches('/');

        if let Some(base) = &self.public_base_url {
            return format!("{}/{}", base.trim_end_matches('/'), key);
        }

        match &self.region {
            Some(region) => format!("https://{}.s3.{}.amazonaws.com/{}", self.bucket, region, key),
            None => format!("https://{}.s3.amazonaws.com/{}", self.bucket, key),
        }
    }
}

/// 上传成功后公网地址的获取方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlResolution {
    /// 按 bucket 命名规则在本地拼接
    Local(ObjectLocation),
    /// 调用 `/confirm-upload`，使用服务端返回的地址
    Confirm,
}

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// 最大并发数，`None` 表示不限制
    pub max_concurrent: Option<usize>,

    pub url_resolution: UrlResolution,

    /// 成功后对公网地址发 HEAD 确认对象存在
    pub verify_uploads: bool,

    /// 事件缓存大小
    pub event_capacity: usize,
}

impl ManagerConfig {
    pub fn new(url_resolution: UrlResolution) -> Self {
        Self {
            max_concurrent: None,
            url_resolution,
            verify_uploads: false,
            event_capacity: 256,
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = Some(max_concurrent);
        self
    }

    pub fn with_verification(mut self, verify_uploads: bool) -> Self {
        self.verify_uploads = verify_uploads;
        self
    }
}

#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// 文件通过校验并加入
    Added {
        file_id: FileId,
        name: String,
    },

    /// 状态变更
    StateChanged {
        file_id: FileId,
        old_state: UploadState,
        new_state: UploadState,
    },

    /// 进度更新
    Progress {
        file_id: FileId,
        attempt: u32,
        percent: u8,
    },

    /// 上传成功
    Completed {
        file_id: FileId,
        remote_url: String,
    },

    /// 上传失败
    Failed {
        file_id: FileId,
        error: String,
    },

    /// 被用户移除
    Removed {
        file_id: FileId,
    },
}

impl UploadEvent {
    pub fn file_id(&self) -> FileId {
        match self {
            UploadEvent::Added { file_id, .. }
            | UploadEvent::StateChanged { file_id, .. }
            | UploadEvent::Progress { file_id, .. }
            | UploadEvent::Completed { file_id, .. }
            | UploadEvent::Failed { file_id, .. }
            | UploadEvent::Removed { file_id } => *file_id,
        }
    }
}

/// 上传管理器命令
pub enum ManagerCommand {
    /// 校验并加入一批文件
    AddFiles {
        candidates: Vec<CandidateFile>,
        reply: oneshot::Sender<IntakeReport>,
    },

    /// 重试失败的文件
    Retry {
        file_id: FileId,
        reply: oneshot::Sender<Result<()>>,
    },

    /// 移除文件
    Remove {
        file_id: FileId,
        reply: oneshot::Sender<Result<FileRecord>>,
    },

    /// 获取单个记录
    GetRecord {
        file_id: FileId,
        reply: oneshot::Sender<Option<FileRecord>>,
    },

    /// 获取所有记录
    GetAllRecords {
        reply: oneshot::Sender<Vec<FileRecord>>,
    },

    /// 关闭管理器，回复释放的预览数
    Shutdown {
        reply: oneshot::Sender<usize>,
    },
}

/// 上传任务回报给管理器的消息
#[derive(Debug)]
pub(crate) enum TaskUpdate {
    Progress {
        file_id: FileId,
        attempt: u32,
        percent: u8,
    },
    Finished {
        file_id: FileId,
        attempt: u32,
        result: Result<UploadOutcome>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UploadOutcome {
    pub remote_url: String,
    pub key: String,
}

// 静态断言确保类型是 Send的
const _: () = {
    fn assert_send<T: Send>() {}
    fn assert_types() {
        assert_send::<FileRecord>();
        assert_send::<UploadEvent>();
        assert_send::<ManagerCommand>();
    }
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transition() {
        use UploadState::*;

        // valid
        assert!(Pending.can_transition_to(Uploading));
        assert!(Uploading.can_transition_to(Success));
        assert!(Uploading.can_transition_to(Error));
        assert!(Error.can_transition_to(Uploading));

        // invalid
        assert!(!Success.can_transition_to(Uploading));
        assert!(!Success.can_transition_to(Error));
        assert!(!Pending.can_transition_to(Success));
        assert!(!Error.can_transition_to(Success));
    }

    #[test]
    fn test_file_id_generation() {
        let id1 = FileId::new();
        let id2 = FileId::new();

        assert_ne!(id1, id2);
        assert_eq!(id1, id1);
        assert!(!id1.to_string().is_empty());
    }

    #[test]
    fn test_public_url() {
        let location = ObjectLocation::new("media-bucket");
        assert_eq!(
            location.public_url("uploads/123-a.png"),
            "https://media-bucket.s3.amazonaws.com/uploads/123-a.png"
        );

        let location = ObjectLocation::new("media-bucket").with_region("eu-west-1");
        assert_eq!(
            location.public_url("uploads/123-a.png"),
            "https://media-bucket.s3.eu-west-1.amazonaws.com/uploads/123-a.png"
        );

        let location = ObjectLocation::new("ignored").with_public_base_url("https://cdn.example.com/");
        assert_eq!(location.public_url("/uploads/1-b.gif"), "https://cdn.example.com/uploads/1-b.gif");
    }

    #[test]
    fn test_confirmation_wire_format() {
        let body = r#"{"success":true,"message":"Upload confirmed","imageUrl":"https://b.s3.amazonaws.com/uploads/1-a.png"}"#;
        let confirmation: UploadConfirmation = serde_json::from_str(body).unwrap();

        assert!(confirmation.success);
        assert_eq!(confirmation.image_url, "https://b.s3.amazonaws.com/uploads/1-a.png");
    }

    #[test]
    fn test_status_serialization() {
        let status = UploadStatus::Uploading { progress_percent: 40 };
        let value = serde_json::to_value(&status).unwrap();

        assert_eq!(value["status"], "uploading");
        assert_eq!(value["progress_percent"], 40);
    }
}
