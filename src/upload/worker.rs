use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use super::errors::{Result, UploadError};
use super::progress::{AttemptProgress, ProgressCallback};
use super::traits::{AuthorizationProvider, ObjectTransfer, TransferRequest};
use super::types::{FileId, FileSource, TaskUpdate, UploadOutcome, UrlResolution};

/// 单次上传尝试需要的文件信息
#[derive(Debug, Clone)]
pub(crate) struct AttemptJob {
    pub file_id: FileId,
    pub attempt: u32,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub source: FileSource,
}

pub(crate) struct UploadWorker {
    pub(crate) provider: Arc<dyn AuthorizationProvider>,
    pub(crate) transfer: Arc<dyn ObjectTransfer>,
    pub(crate) url_resolution: UrlResolution,
    pub(crate) verify_uploads: bool,
    pub(crate) limiter: Option<Arc<Semaphore>>,
    pub(crate) cancellation_token: CancellationToken,
}

impl UploadWorker {
    pub async fn run(self, job: AttemptJob, update_tx: mpsc::UnboundedSender<TaskUpdate>) {
        let file_id = job.file_id;
        let attempt = job.attempt;

        // 执行
        let result = tokio::select! {
            biased;
            _ = self.cancellation_token.cancelled() => Err(UploadError::Cancelled),
            result = self.execute(&job, &update_tx) => result,
        };

        let _ = update_tx.send(TaskUpdate::Finished { file_id, attempt, result });
    }

    async fn execute(&self, job: &AttemptJob, update_tx: &mpsc::UnboundedSender<TaskUpdate>) -> Result<UploadOutcome> {
        let _permit = match &self.limiter {
            Some(limiter) => Some(
                limiter.clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| UploadError::ManagerShutdown)?
            ),
            None => None,
        };

        // 1. 申请上传地址
        let authorization = self.provider
            .authorize(&job.name, &job.mime_type)
            .await
            .map_err(|err| match err {
                err @ UploadError::Authorization { .. } => err,
                err => UploadError::authorization(None, err.to_string()),
            })?;

        tracing::debug!(file_id = %job.file_id, attempt = job.attempt, key = %authorization.key, "authorized");

        // 2. 传输，进度只在变大时上报
        let tracker = Mutex::new(AttemptProgress::new(job.size));
        let progress: ProgressCallback = {
            let update_tx = update_tx.clone();
            let file_id = job.file_id;
            let attempt = job.attempt;

            Arc::new(move |bytes_sent: u64, total: Option<u64>| {
                let percent = tracker
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .observe(bytes_sent, total);

                if let Some(percent) = percent {
                    let _ = update_tx.send(TaskUpdate::Progress { file_id, attempt, percent });
                }
            })
        };

        let request = TransferRequest {
            url: authorization.url,
            mime_type: job.mime_type.clone(),
            size: job.size,
            source: job.source.clone(),
        };

        self.transfer
            .put(request, progress)
            .await
            .map_err(|err| match err {
                err @ UploadError::Transfer { .. } => err,
                err => UploadError::transfer(None, err.to_string()),
            })?;

        // 3. 公网地址
        let key = authorization.key;
        let remote_url = match &self.url_resolution {
            UrlResolution::Local(location) => location.public_url(&key),
            UrlResolution::Confirm => self.provider.confirm(&key).await?.image_url,
        };

        if self.verify_uploads {
            match self.transfer.exists(&remote_url).await {
                Ok(true) => {}
                Ok(false) => {
                    return Err(UploadError::Verification(format!("no object at {}", remote_url)));
                }
                Err(err @ UploadError::Verification(_)) => return Err(err),
                Err(err) => return Err(UploadError::Verification(err.to_string())),
            }
        }

        Ok(UploadOutcome { remote_url, key })
    }
}
