use std::fmt;
use std::path::Path;
use bytes::Bytes;
use super::errors::Result;
use super::preview::{PreviewHandle, PreviewRegistry};
use super::record::FileRecord;
use super::types::{FileId, FileSource};

/// 单个文件大小上限 15MB
pub const MAX_FILE_SIZE: u64 = 15 * 1024 * 1024;

/// 允许上传的 MIME 类型
pub const ALLOWED_MIME_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/png",
    "image/gif",
    "video/mp4",
    "video/quicktime",
];

/// 待校验的文件，来自文件选择、拖放或命令行路径
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub source: FileSource,
}

impl CandidateFile {
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();

        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size: data.len() as u64,
            source: FileSource::Memory(data),
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Not a file: {}", path.display()),
            ).into());
        }

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            name,
            mime_type: mime_type_for_path(path).to_string(),
            size: metadata.len(),
            source: FileSource::Path(path.to_path_buf()),
        })
    }
}

/// 根据扩展名推断 MIME 类型，未知类型一律 `application/octet-stream`
pub fn mime_type_for_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("mp4") => "video/mp4",
        Some("mov") | Some("qt") => "video/quicktime",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    UnsupportedType,
    TooLarge,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::UnsupportedType => write!(f, "unsupported type"),
            RejectReason::TooLarge => write!(f, "exceeds 15MB limit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub name: String,
    pub reason: RejectReason,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.reason)
    }
}

/// 类型检查在前，大小检查在后
pub fn check(candidate: &CandidateFile) -> std::result::Result<(), RejectReason> {
    let mime_type = candidate.mime_type.trim();
    if !ALLOWED_MIME_TYPES.iter().any(|allowed| allowed.eq_ignore_ascii_case(mime_type)) {
        return Err(RejectReason::UnsupportedType);
    }

    if candidate.size > MAX_FILE_SIZE {
        return Err(RejectReason::TooLarge);
    }

    Ok(())
}

/// 通过校验的文件：初始记录、预览句柄和内容来源
#[derive(Debug)]
pub struct AcceptedFile {
    pub record: FileRecord,
    pub preview: PreviewHandle,
    pub source: FileSource,
}

#[derive(Debug, Default)]
pub struct IntakeOutcome {
    pub accepted: Vec<AcceptedFile>,
    pub rejections: Vec<Rejection>,
}

impl IntakeOutcome {
    pub fn summary(&self) -> Option<String> {
        rejection_summary(&self.rejections)
    }
}

/// 把所有被拒文件合并成一条提示，没有被拒时返回 `None`
pub fn rejection_summary(rejections: &[Rejection]) -> Option<String> {
    if rejections.is_empty() {
        return None;
    }

    let entries: Vec<String> = rejections.iter().map(ToString::to_string).collect();
    Some(format!("Some files were rejected: {}", entries.join(", ")))
}

/// 校验一批文件，只做划分，不做 IO
pub fn intake<I>(candidates: I, previews: &PreviewRegistry) -> IntakeOutcome
where
    I: IntoIterator<Item = CandidateFile>,
{
    let mut outcome = IntakeOutcome::default();

    for candidate in candidates {
        if let Err(reason) = check(&candidate) {
            tracing::debug!(name = %candidate.name, mime_type = %candidate.mime_type, size = candidate.size, %reason, "file rejected");
            outcome.rejections.push(Rejection {
                name: candidate.name,
                reason,
            });
            continue;
        }

        let preview = previews.create(&candidate.source);
        let record = FileRecord::new(
            candidate.name,
            candidate.size,
            candidate.mime_type.trim().to_ascii_lowercase(),
            preview.url(),
        );

        outcome.accepted.push(AcceptedFile {
            record,
            preview,
            source: candidate.source,
        });
    }

    outcome
}

/// 返回给调用方的校验结果
#[derive(Debug, Clone, Default)]
pub struct IntakeReport {
    pub accepted: Vec<FileId>,
    pub rejections: Vec<Rejection>,
    pub summary: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::types::UploadState;

    fn candidate(name: &str, mime_type: &str, size: u64) -> CandidateFile {
        CandidateFile {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            size,
            source: FileSource::Memory(Bytes::new()),
        }
    }

    #[test]
    fn test_accepts_supported_file() {
        let previews = PreviewRegistry::new();
        let outcome = intake(vec![candidate("a.png", "image/png", 1000)], &previews);

        assert_eq!(outcome.accepted.len(), 1);
        assert!(outcome.rejections.is_empty());
        assert!(outcome.summary().is_none());

        let record = &outcome.accepted[0].record;
        assert_eq!(record.name, "a.png");
        assert_eq!(record.size_bytes, 1000);
        assert_eq!(record.mime_type, "image/png");
        assert_eq!(record.state(), UploadState::Pending);
        assert_eq!(record.progress_percent(), 0);
        assert_eq!(record.preview_url, outcome.accepted[0].preview.url());
        assert_eq!(previews.live_count(), 1);
    }

    #[test]
    fn test_rejects_unsupported_type() {
        let previews = PreviewRegistry::new();
        let outcome = intake(vec![candidate("b.txt", "text/plain", 500)], &previews);

        assert!(outcome.accepted.is_empty());
        assert_eq!(outcome.rejections[0].reason, RejectReason::UnsupportedType);
        assert!(outcome.summary().unwrap().contains("b.txt (unsupported type)"));
        assert_eq!(previews.live_count(), 0);
    }

    #[test]
    fn test_rejects_oversized_file() {
        let previews = PreviewRegistry::new();
        let outcome = intake(vec![candidate("c.mp4", "video/mp4", 20 * 1024 * 1024)], &previews);

        assert!(outcome.accepted.is_empty());
        assert!(outcome.summary().unwrap().contains("c.mp4 (exceeds 15MB limit)"));
    }

    #[test]
    fn test_size_limit_is_inclusive() {
        assert!(check(&candidate("max.mov", "video/quicktime", MAX_FILE_SIZE)).is_ok());
        assert_eq!(
            check(&candidate("over.mov", "video/quicktime", MAX_FILE_SIZE + 1)),
            Err(RejectReason::TooLarge)
        );
    }

    #[test]
    fn test_type_checked_before_size() {
        assert_eq!(
            check(&candidate("huge.zip", "application/zip", MAX_FILE_SIZE * 2)),
            Err(RejectReason::UnsupportedType)
        );
    }

    #[test]
    fn test_mixed_batch_keeps_valid_files() {
        let previews = PreviewRegistry::new();
        let outcome = intake(
            vec![
                candidate("a.jpg", "image/jpeg", 10),
                candidate("b.txt", "text/plain", 10),
                candidate("c.gif", "image/gif", 10),
                candidate("d.mp4", "video/mp4", MAX_FILE_SIZE + 1),
            ],
            &previews,
        );

        let names: Vec<_> = outcome.accepted.iter().map(|f| f.record.name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "c.gif"]);
        assert_ne!(outcome.accepted[0].record.id, outcome.accepted[1].record.id);
        assert_eq!(
            outcome.summary().unwrap(),
            "Some files were rejected: b.txt (unsupported type), d.mp4 (exceeds 15MB limit)"
        );
    }

    #[test]
    fn test_mime_type_for_path() {
        assert_eq!(mime_type_for_path(Path::new("photo.JPG")), "image/jpeg");
        assert_eq!(mime_type_for_path(Path::new("clip.mov")), "video/quicktime");
        assert_eq!(mime_type_for_path(Path::new("notes.txt")), "application/octet-stream");
        assert_eq!(mime_type_for_path(Path::new("no_extension")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_candidate_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cat.gif");
        tokio::fs::write(&path, vec![0u8; 2048]).await.unwrap();

        let candidate = CandidateFile::from_path(&path).await.unwrap();
        assert_eq!(candidate.name, "cat.gif");
        assert_eq!(candidate.mime_type, "image/gif");
        assert_eq!(candidate.size, 2048);

        assert!(CandidateFile::from_path(dir.path()).await.is_err());
    }
}
