mod client;
mod errors;
mod manager;
mod manager_worker;
mod progress_stream;
mod record;
mod traits;
mod worker;
pub mod intake;
pub mod preview;
pub mod progress;
pub mod types;

pub use client::{HttpAuthorizationProvider, HttpObjectTransfer, DEFAULT_CHUNK_SIZE};
pub use errors::{Result, UploadError, GENERIC_TRANSFER_MESSAGE};
pub use intake::{CandidateFile, IntakeReport, RejectReason, Rejection, ALLOWED_MIME_TYPES, MAX_FILE_SIZE};
pub use manager::{FilteredEventReceiver, UploadManager, UploadManagerHandle};
pub use progress::ProgressCallback;
pub use progress_stream::ProgressStream;
pub use record::FileRecord;
pub use traits::{AuthorizationProvider, ObjectTransfer, TransferRequest};
pub use types::{
    FileId,
    FileSource,
    ManagerConfig,
    ObjectLocation,
    UploadAuthorization,
    UploadConfirmation,
    UploadEvent,
    UploadState,
    UploadStatus,
    UrlResolution,
};
