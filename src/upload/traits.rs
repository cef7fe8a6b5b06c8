use async_trait::async_trait;
use super::errors::Result;
use super::progress::ProgressCallback;
use super::types::{FileSource, UploadAuthorization, UploadConfirmation};

/// 上传授权方：为单个文件签发一次性的上传地址
#[async_trait]
pub trait AuthorizationProvider: Send + Sync {
    /// 申请上传地址，服务端负责生成不冲突的 key
    async fn authorize(&self, filename: &str, filetype: &str) -> Result<UploadAuthorization>;

    /// 确认上传并取回公网地址
    async fn confirm(&self, key: &str) -> Result<UploadConfirmation>;
}

/// 一次字节传输所需的全部信息
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub url: String,
    pub mime_type: String,
    pub size: u64,
    pub source: FileSource,
}

/// 对象传输通道
#[async_trait]
pub trait ObjectTransfer: Send + Sync {
    /// 上传文件内容，传输过程中通过 `progress` 回报已发送字节数
    async fn put(&self, request: TransferRequest, progress: ProgressCallback) -> Result<()>;

    /// 检查对象是否存在
    async fn exists(&self, url: &str) -> Result<bool>;
}
