use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use super::errors::{Result, UploadError};
use super::intake::{intake, CandidateFile, IntakeReport};
use super::preview::{PreviewHandle, PreviewRegistry};
use super::record::FileRecord;
use super::traits::{AuthorizationProvider, ObjectTransfer};
use super::types::{
    FileId,
    FileSource,
    ManagerCommand,
    ManagerConfig,
    TaskUpdate,
    UploadEvent,
    UploadOutcome,
    UploadState,
};
use super::worker::{AttemptJob, UploadWorker};

struct ManagedFile {
    record: FileRecord,
    source: FileSource,
    preview: PreviewHandle,
    cancellation_token: Option<CancellationToken>,
    join_handle: Option<JoinHandle<()>>,
}

pub struct UploadManagerWorker {
    provider: Arc<dyn AuthorizationProvider>,
    transfer: Arc<dyn ObjectTransfer>,
    config: ManagerConfig,
    previews: PreviewRegistry,
    limiter: Option<Arc<Semaphore>>,

    files: HashMap<FileId, ManagedFile>,
    /// 加入顺序
    order: Vec<FileId>,

    event_tx: broadcast::Sender<UploadEvent>,
    records_tx: watch::Sender<Vec<FileRecord>>,
    update_tx: mpsc::UnboundedSender<TaskUpdate>,
    update_rx: mpsc::UnboundedReceiver<TaskUpdate>,
}

impl UploadManagerWorker {
    pub(crate) fn new(
        provider: Arc<dyn AuthorizationProvider>,
        transfer: Arc<dyn ObjectTransfer>,
        config: ManagerConfig,
        previews: PreviewRegistry,
        event_tx: broadcast::Sender<UploadEvent>,
        records_tx: watch::Sender<Vec<FileRecord>>,
    ) -> Self {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let limiter = config.max_concurrent.map(|permits| Arc::new(Semaphore::new(permits.max(1))));

        Self {
            provider,
            transfer,
            config,
            previews,
            limiter,
            files: HashMap::new(),
            order: Vec::new(),
            event_tx,
            records_tx,
            update_tx,
            update_rx,
        }
    }

    pub(crate) async fn run(mut self, mut command_rx: mpsc::Receiver<ManagerCommand>) {
        // 主事件循环
        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    match command {
                        Some(ManagerCommand::Shutdown { reply }) => {
                            let released = self.teardown();
                            let _ = reply.send(released);
                            return;
                        }
                        Some(command) => self.handle_command(command),
                        None => break,
                    }
                }
                Some(update) = self.update_rx.recv() => {
                    self.handle_update(update);
                }
            }
        }

        // 所有句柄都被 drop
        self.teardown();
    }

    fn handle_command(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::AddFiles { candidates, reply } => {
                let report = self.add_files(candidates);
                let _ = reply.send(report);
            }
            ManagerCommand::Retry { file_id, reply } => {
                let result = self.retry(file_id);
                let _ = reply.send(result);
            }
            ManagerCommand::Remove { file_id, reply } => {
                let result = self.remove(file_id);
                let _ = reply.send(result);
            }
            ManagerCommand::GetRecord { file_id, reply } => {
                let record = self.files
                    .get(&file_id)
                    .map(|file| file.record.clone());
                let _ = reply.send(record);
            }
            ManagerCommand::GetAllRecords { reply } => {
                let _ = reply.send(self.snapshot());
            }
            ManagerCommand::Shutdown { reply } => {
                let _ = reply.send(self.teardown());
            }
        }
    }

    fn add_files(&mut self, candidates: Vec<CandidateFile>) -> IntakeReport {
        let outcome = intake(candidates, &self.previews);
        let summary = outcome.summary();

        if let Some(summary) = &summary {
            tracing::info!(rejected = outcome.rejections.len(), "{}", summary);
        }

        let mut accepted = Vec::with_capacity(outcome.accepted.len());
        for file in outcome.accepted {
            let file_id = file.record.id;
            tracing::info!(%file_id, name = %file.record.name, size = file.record.size_bytes, "file accepted");

            let _ = self.event_tx.send(UploadEvent::Added {
                file_id,
                name: file.record.name.clone(),
            });

            self.files.insert(file_id, ManagedFile {
                record: file.record,
                source: file.source,
                preview: file.preview,
                cancellation_token: None,
                join_handle: None,
            });
            self.order.push(file_id);
            accepted.push(file_id);
        }

        // 自动开始上传
        for file_id in &accepted {
            self.start_upload(*file_id);
        }
        self.publish();

        IntakeReport {
            accepted,
            rejections: outcome.rejections,
            summary,
        }
    }

    fn retry(&mut self, file_id: FileId) -> Result<()> {
        let file = self.files
            .get(&file_id)
            .ok_or(UploadError::NotFound(file_id))?;

        if !file.record.can_retry() {
            return Err(UploadError::NotRetriable {
                id: file_id,
                state: file.record.state(),
            });
        }

        tracing::info!(%file_id, "retrying upload");
        self.start_upload(file_id);
        self.publish();

        Ok(())
    }

    fn remove(&mut self, file_id: FileId) -> Result<FileRecord> {
        let file = self.files
            .remove(&file_id)
            .ok_or(UploadError::NotFound(file_id))?;
        self.order.retain(|id| *id != file_id);

        let ManagedFile { record, preview, join_handle, .. } = file;

        // 进行中的上传继续跑完，结果在 handle_update 里因找不到记录而丢弃
        if join_handle.is_some_and(|handle| !handle.is_finished()) {
            tracing::debug!(%file_id, "removed while uploading, result will be discarded");
        }
        preview.release();

        tracing::info!(%file_id, name = %record.name, "file removed");
        let _ = self.event_tx.send(UploadEvent::Removed { file_id });
        self.publish();

        Ok(record)
    }

    fn start_upload(&mut self, file_id: FileId) {
        let file = match self.files.get_mut(&file_id) {
            Some(file) => file,
            None => return,
        };

        let old_state = file.record.state();
        let attempt = match file.record.begin_attempt() {
            Some(attempt) => attempt,
            None => return,
        };

        let cancellation_token = CancellationToken::new();
        file.cancellation_token = Some(cancellation_token.clone());

        let worker = UploadWorker {
            provider: self.provider.clone(),
            transfer: self.transfer.clone(),
            url_resolution: self.config.url_resolution.clone(),
            verify_uploads: self.config.verify_uploads,
            limiter: self.limiter.clone(),
            cancellation_token,
        };

        let job = AttemptJob {
            file_id,
            attempt,
            name: file.record.name.clone(),
            mime_type: file.record.mime_type.clone(),
            size: file.record.size_bytes,
            source: file.source.clone(),
        };

        file.join_handle = Some(tokio::spawn(worker.run(job, self.update_tx.clone())));

        tracing::debug!(%file_id, attempt, "upload started");
        self.emit_state_change(file_id, old_state, UploadState::Uploading);
    }

    fn handle_update(&mut self, update: TaskUpdate) {
        match update {
            TaskUpdate::Progress { file_id, attempt, percent } => {
                let file = match self.current_attempt(file_id, attempt) {
                    Some(file) => file,
                    None => return,
                };

                if file.record.update_progress(percent) {
                    let _ = self.event_tx.send(UploadEvent::Progress { file_id, attempt, percent });
                    self.publish();
                }
            }
            TaskUpdate::Finished { file_id, attempt, result } => {
                if self.current_attempt(file_id, attempt).is_none() {
                    tracing::debug!(%file_id, attempt, "discarding result of removed or stale upload");
                    return;
                }

                self.handle_task_completion(file_id, result);
            }
        }
    }

    /// 只接受记录当前这次尝试的消息
    fn current_attempt(&mut self, file_id: FileId, attempt: u32) -> Option<&mut ManagedFile> {
        self.files
            .get_mut(&file_id)
            .filter(|file| file.record.attempts == attempt && file.record.state() == UploadState::Uploading)
    }

    fn handle_task_completion(&mut self, file_id: FileId, result: Result<UploadOutcome>) {
        let file = match self.files.get_mut(&file_id) {
            Some(file) => file,
            None => return,
        };

        file.cancellation_token = None;
        file.join_handle = None;

        match result {
            Ok(UploadOutcome { remote_url, key }) => {
                file.record.mark_success(remote_url.clone(), key);
                tracing::info!(%file_id, %remote_url, "upload completed");

                self.emit_state_change(file_id, UploadState::Uploading, UploadState::Success);
                let _ = self.event_tx.send(UploadEvent::Completed { file_id, remote_url });
            }
            Err(err) => {
                let error = err.to_string();
                file.record.mark_failed(error.clone());
                tracing::warn!(%file_id, attempt = file.record.attempts, %error, "upload failed");

                self.emit_state_change(file_id, UploadState::Uploading, UploadState::Error);
                let _ = self.event_tx.send(UploadEvent::Failed { file_id, error });
            }
        }

        self.publish();
    }

    fn emit_state_change(&self, file_id: FileId, old_state: UploadState, new_state: UploadState) {
        let _ = self.event_tx.send(UploadEvent::StateChanged {
            file_id,
            old_state,
            new_state,
        });
    }

    fn snapshot(&self) -> Vec<FileRecord> {
        self.order
            .iter()
            .filter_map(|id| self.files.get(id))
            .map(|file| file.record.clone())
            .collect()
    }

    fn publish(&self) {
        self.records_tx.send_replace(self.snapshot());
    }

    /// 取消进行中的上传并释放所有预览，返回释放数量
    fn teardown(&mut self) -> usize {
        let mut released = 0;

        for (_, file) in self.files.drain() {
            if let Some(token) = &file.cancellation_token {
                token.cancel();
            }
            if file.preview.release() {
                released += 1;
            }
        }
        self.order.clear();

        if let Some(limiter) = &self.limiter {
            limiter.close();
        }

        tracing::info!(released, "upload manager shut down");
        self.publish();
        released
    }
}
