use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use super::errors::{Result, UploadError};
use super::intake::{CandidateFile, IntakeReport};
use super::manager_worker::UploadManagerWorker;
use super::preview::PreviewRegistry;
use super::record::FileRecord;
use super::traits::{AuthorizationProvider, ObjectTransfer};
use super::types::{FileId, ManagerCommand, ManagerConfig, UploadEvent};

#[derive(Clone)]
pub struct UploadManager {
    command_tx: mpsc::Sender<ManagerCommand>,
    event_tx: broadcast::Sender<UploadEvent>,
    records_rx: watch::Receiver<Vec<FileRecord>>,
    previews: PreviewRegistry,
}

/// 上传管理器句柄 - 包含管理器和工作线程
pub struct UploadManagerHandle {
    pub manager: UploadManager,
    pub worker_handle: JoinHandle<()>,
}

impl UploadManagerHandle {
    /// 关闭管理器：取消进行中的上传并释放所有预览，返回释放的预览数
    pub async fn shutdown(self) -> Result<usize> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self.manager.command_tx
            .send(ManagerCommand::Shutdown { reply: reply_tx })
            .await;

        let released = match sent {
            Ok(()) => reply_rx.await.unwrap_or(0),
            Err(_) => 0,
        };

        drop(self.manager);
        self.worker_handle.await
            .map_err(|err| UploadError::internal_error(format!("Worker panic: {}", err)))?;

        Ok(released)
    }
}

impl UploadManager {
    pub fn new(
        provider: Arc<dyn AuthorizationProvider>,
        transfer: Arc<dyn ObjectTransfer>,
        config: ManagerConfig,
    ) -> UploadManagerHandle {
        let (command_tx, command_rx) = mpsc::channel(100);
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let (records_tx, records_rx) = watch::channel(Vec::new());
        let previews = PreviewRegistry::new();

        let worker = UploadManagerWorker::new(
            provider,
            transfer,
            config,
            previews.clone(),
            event_tx.clone(),
            records_tx,
        );
        let worker_handle = tokio::spawn(worker.run(command_rx));

        let manager = Self {
            command_tx,
            event_tx,
            records_rx,
            previews,
        };

        UploadManagerHandle {
            manager,
            worker_handle,
        }
    }

    async fn request<T>(&self, command: ManagerCommand, reply_rx: oneshot::Receiver<T>) -> Result<T> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| UploadError::ManagerShutdown)?;

        // 等待响应
        reply_rx
            .await
            .map_err(|_| UploadError::ManagerShutdown)
    }

    /// 校验一批文件，通过的立即开始上传
    pub async fn add_files(&self, candidates: Vec<CandidateFile>) -> Result<IntakeReport> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request(ManagerCommand::AddFiles { candidates, reply: reply_tx }, reply_rx).await
    }

    /// 重试失败的文件，其他状态返回 `NotRetriable`
    pub async fn retry(&self, file_id: FileId) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request(ManagerCommand::Retry { file_id, reply: reply_tx }, reply_rx).await?
    }

    /// Remove file, its preview is released
    pub async fn remove(&self, file_id: FileId) -> Result<FileRecord> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request(ManagerCommand::Remove { file_id, reply: reply_tx }, reply_rx).await?
    }

    /// Get record
    pub async fn get_record(&self, file_id: FileId) -> Result<Option<FileRecord>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request(ManagerCommand::GetRecord { file_id, reply: reply_tx }, reply_rx).await
    }

    /// Get all records
    pub async fn get_all_records(&self) -> Result<Vec<FileRecord>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request(ManagerCommand::GetAllRecords { reply: reply_tx }, reply_rx).await
    }

    /// 最近一次发布的记录列表
    pub fn snapshot(&self) -> Vec<FileRecord> {
        self.records_rx.borrow().clone()
    }

    /// 订阅记录列表，每次状态变化都会发布完整列表
    pub fn subscribe_records(&self) -> watch::Receiver<Vec<FileRecord>> {
        self.records_rx.clone()
    }

    /// 订阅事件
    ///
    /// 注意：
    /// - 如果接收速度跟不上发送速度，可能会丢失事件（lagged error）
    /// - 每个订阅者都会收到完整的事件副本
    pub fn subscribe_events(&self) -> broadcast::Receiver<UploadEvent> {
        self.event_tx.subscribe()
    }

    pub fn subscribe_filtered<F>(&self, filter: F) -> FilteredEventReceiver<F> {
        FilteredEventReceiver {
            receiver: self.event_tx.subscribe(),
            filter
        }
    }

    /// 等到没有 pending / uploading 的记录
    pub async fn wait_settled(&self) -> Result<Vec<FileRecord>> {
        let mut records_rx = self.records_rx.clone();
        let records = records_rx
            .wait_for(|records| records.iter().all(FileRecord::is_settled))
            .await
            .map_err(|_| UploadError::ManagerShutdown)?;

        Ok(records.clone())
    }

    /// 预览地址解析
    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }
}

/// 过滤的事件接收器
pub struct FilteredEventReceiver<F> {
    receiver: broadcast::Receiver<UploadEvent>,
    filter: F,
}

impl<F> FilteredEventReceiver<F>
where
    F: Fn(&UploadEvent) -> bool,
{
    pub async fn recv(&mut self) -> Result<UploadEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if (self.filter)(&event) {
                return Ok(event);
            }
        }
    }
}
