pub mod config;
pub mod upload;
pub mod utils;

// 重新导出常用类型
pub use config::Config;
pub use upload::{
    AuthorizationProvider,
    CandidateFile,
    FileId,
    FileRecord,
    HttpAuthorizationProvider,
    HttpObjectTransfer,
    IntakeReport,
    ManagerConfig,
    ObjectLocation,
    ObjectTransfer,
    Result,
    UploadError,
    UploadEvent,
    UploadManager,
    UploadManagerHandle,
    UploadState,
    UploadStatus,
    UrlResolution,
};
