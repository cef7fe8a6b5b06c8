use std::sync::Arc;

/// 传输进度回调：(已发送字节数, 总字节数)
pub type ProgressCallback = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// 四舍五入的百分比。没有总数时用声明大小，空文件直接视为 100
pub fn percent_of(bytes_sent: u64, total: Option<u64>, declared_size: u64) -> u8 {
    let total = total.filter(|total| *total > 0).unwrap_or(declared_size);
    if total == 0 {
        return 100;
    }

    let sent = bytes_sent.min(total) as u128;
    let total = total as u128;
    ((sent * 200 + total) / (total * 2)) as u8
}

/// 单次上传尝试内的进度，只往前走
#[derive(Debug, Clone)]
pub struct AttemptProgress {
    declared_size: u64,
    last_percent: u8,
}

impl AttemptProgress {
    pub fn new(declared_size: u64) -> Self {
        Self {
            declared_size,
            last_percent: 0,
        }
    }

    /// 百分比变大时返回新值，变小（传输层回退）或不变时返回 `None`
    pub fn observe(&mut self, bytes_sent: u64, total: Option<u64>) -> Option<u8> {
        let percent = percent_of(bytes_sent, total, self.declared_size);
        if percent <= self.last_percent {
            return None;
        }

        self.last_percent = percent;
        Some(percent)
    }

    pub fn last_percent(&self) -> u8 {
        self.last_percent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_rounding() {
        assert_eq!(percent_of(0, Some(1000), 1000), 0);
        assert_eq!(percent_of(4, Some(1000), 1000), 0);
        assert_eq!(percent_of(5, Some(1000), 1000), 1);
        assert_eq!(percent_of(400, Some(1000), 1000), 40);
        assert_eq!(percent_of(1000, Some(1000), 1000), 100);
        assert_eq!(percent_of(1, Some(3), 3), 33);
        assert_eq!(percent_of(2, Some(3), 3), 67);
    }

    #[test]
    fn test_percent_falls_back_to_declared_size() {
        assert_eq!(percent_of(500, None, 1000), 50);
        assert_eq!(percent_of(500, Some(0), 1000), 50);
        assert_eq!(percent_of(0, None, 0), 100);
    }

    #[test]
    fn test_percent_is_capped() {
        assert_eq!(percent_of(5000, Some(1000), 1000), 100);
    }

    #[test]
    fn test_attempt_progress_is_monotonic() {
        let mut progress = AttemptProgress::new(1000);

        assert_eq!(progress.observe(0, None), None);
        assert_eq!(progress.observe(250, None), Some(25));
        assert_eq!(progress.observe(600, None), Some(60));
        // 传输层回报了更小的值
        assert_eq!(progress.observe(300, None), None);
        assert_eq!(progress.last_percent(), 60);
        assert_eq!(progress.observe(1000, Some(1000)), Some(100));
    }
}
