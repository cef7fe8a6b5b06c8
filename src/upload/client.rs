use std::io;
use std::time::Duration;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use url::Url;
use super::errors::{Result, UploadError};
use super::progress::ProgressCallback;
use super::progress_stream::ProgressStream;
use super::traits::{AuthorizationProvider, ObjectTransfer, TransferRequest};
use super::types::{
    ConfirmUploadRequest,
    ErrorBody,
    FileSource,
    UploadAuthorization,
    UploadConfirmation,
    UploadUrlRequest,
};

/// 64KB
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .tcp_nodelay(true)
        .build()
        .map_err(UploadError::from)
}

/// 从错误响应里取出诊断信息：优先 `{ "error": ... }`，其次响应文本，最后是状态码
async fn diagnostic(response: Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    if let Ok(ErrorBody { error: Some(error) }) = serde_json::from_str::<ErrorBody>(&text) {
        return error;
    }

    let text = text.trim();
    if !text.is_empty() && text.len() <= 512 {
        return format!("server responded with status {}: {}", status, text);
    }

    format!("server responded with status {}", status)
}

/// 授权服务的 HTTP 客户端
#[derive(Debug, Clone)]
pub struct HttpAuthorizationProvider {
    client: Client,
    endpoint: Url,
}

impl HttpAuthorizationProvider {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        Self::with_client(build_client(timeout)?, endpoint)
    }

    pub fn with_client(client: Client, endpoint: &str) -> Result<Self> {
        let mut endpoint = Url::parse(endpoint)
            .map_err(|err| UploadError::Config(format!("Invalid endpoint {:?}: {}", endpoint, err)))?;

        // 保证 join 时保留已有路径
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn route(&self, path: &str) -> Result<Url> {
        self.endpoint
            .join(path)
            .map_err(|err| UploadError::Config(format!("Invalid route {:?}: {}", path, err)))
    }
}

#[async_trait]
impl AuthorizationProvider for HttpAuthorizationProvider {
    async fn authorize(&self, filename: &str, filetype: &str) -> Result<UploadAuthorization> {
        let url = self.route("get-upload-url")?;
        let body = UploadUrlRequest {
            filename: filename.to_string(),
            filetype: filetype.to_string(),
        };

        let response = self.client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|err| UploadError::authorization(None, err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = diagnostic(response).await;
            return Err(UploadError::authorization(Some(status.as_u16()), message));
        }

        let authorization = response
            .json::<UploadAuthorization>()
            .await
            .map_err(|err| UploadError::authorization(Some(status.as_u16()), format!("invalid response: {}", err)))?;

        tracing::debug!(filename, key = %authorization.key, "upload url issued");
        Ok(authorization)
    }

    async fn confirm(&self, key: &str) -> Result<UploadConfirmation> {
        let url = self.route("confirm-upload")?;

        let response = self.client
            .post(url)
            .json(&ConfirmUploadRequest { key: key.to_string() })
            .send()
            .await
            .map_err(|err| UploadError::Confirmation(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Confirmation(diagnostic(response).await));
        }

        let confirmation = response
            .json::<UploadConfirmation>()
            .await
            .map_err(|err| UploadError::Confirmation(format!("invalid response: {}", err)))?;

        if !confirmation.success {
            return Err(UploadError::Confirmation(confirmation.message));
        }

        Ok(confirmation)
    }
}

/// 直传对象存储：对预签名地址做 PUT
#[derive(Debug, Clone)]
pub struct HttpObjectTransfer {
    client: Client,
    chunk_size: usize,
}

impl HttpObjectTransfer {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self::with_client(build_client(timeout)?))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    async fn open(&self, source: &FileSource) -> Result<BoxStream<'static, io::Result<Bytes>>> {
        match source {
            FileSource::Path(path) => {
                let file = File::open(path).await?;
                Ok(ReaderStream::with_capacity(file, self.chunk_size).boxed())
            }
            FileSource::Memory(data) => {
                let chunks: Vec<io::Result<Bytes>> = (0..data.len())
                    .step_by(self.chunk_size)
                    .map(|start| Ok(data.slice(start..(start + self.chunk_size).min(data.len()))))
                    .collect();
                Ok(stream::iter(chunks).boxed())
            }
        }
    }
}

#[async_trait]
impl ObjectTransfer for HttpObjectTransfer {
    async fn put(&self, request: TransferRequest, progress: ProgressCallback) -> Result<()> {
        let stream = self.open(&request.source).await?;
        let body = reqwest::Body::wrap_stream(ProgressStream::new(stream, Some(request.size), progress));

        let response = self.client
            .put(&request.url)
            .header(CONTENT_TYPE, &request.mime_type)
            .header(CONTENT_LENGTH, request.size)
            .body(body)
            .send()
            .await
            .map_err(|err| UploadError::transfer(None, err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::transfer(
                Some(status.as_u16()),
                format!("Upload failed with status {}", status),
            ));
        }

        Ok(())
    }

    async fn exists(&self, url: &str) -> Result<bool> {
        let response = self.client.head(url).send().await?;
        let status = response.status();

        match status {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Ok(false),
            status => Err(UploadError::Verification(format!("HEAD {} returned {}", url, status))),
        }
    }
}
