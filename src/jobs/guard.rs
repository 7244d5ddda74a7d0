use tokio::time::{Duration, Instant};

/// 两次请求尝试之间的最小间隔
pub const MIN_REQUEST_SPACING: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InFlight,
    RateLimited,
}

/// 请求守卫：防止并发拉取，并限制拉取频率。
///
/// 两个守卫都是"跳过"语义：被拒绝的请求直接丢弃，不排队也不合并。
#[derive(Debug)]
pub struct RequestGuard {
    in_flight: bool,
    last_attempt: Option<Instant>,
    spacing: Duration,
}

impl Default for RequestGuard {
    fn default() -> Self {
        Self::new(MIN_REQUEST_SPACING)
    }
}

impl RequestGuard {
    pub fn new(spacing: Duration) -> Self {
        Self {
            in_flight: false,
            last_attempt: None,
            spacing,
        }
    }

    /// 尝试开始一次请求；成功时置位 in-flight 并记录尝试时间
    pub fn try_begin(&mut self, now: Instant) -> Result<(), SkipReason> {
        if self.in_flight {
            return Err(SkipReason::InFlight);
        }
        if let Some(last) = self.last_attempt {
            if now.saturating_duration_since(last) < self.spacing {
                return Err(SkipReason::RateLimited);
            }
        }
        self.in_flight = true;
        self.last_attempt = Some(now);
        Ok(())
    }

    /// 请求结束（无论成功失败）
    pub fn finish(&mut self) {
        self.in_flight = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_request_within_spacing_is_skipped() {
        let mut g = RequestGuard::default();
        let t0 = Instant::now();
        assert!(g.try_begin(t0).is_ok());
        g.finish();
        assert_eq!(
            g.try_begin(t0 + Duration::from_millis(2999)),
            Err(SkipReason::RateLimited)
        );
        assert!(g.try_begin(t0 + Duration::from_millis(3000)).is_ok());
    }

    #[test]
    fn in_flight_blocks_regardless_of_elapsed_time() {
        let mut g = RequestGuard::default();
        let t0 = Instant::now();
        g.try_begin(t0).unwrap();
        assert_eq!(
            g.try_begin(t0 + Duration::from_secs(60)),
            Err(SkipReason::InFlight)
        );
        g.finish();
        assert!(g.try_begin(t0 + Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn skipped_attempt_does_not_move_the_window() {
        let mut g = RequestGuard::default();
        let t0 = Instant::now();
        g.try_begin(t0).unwrap();
        g.finish();
        let _ = g.try_begin(t0 + Duration::from_millis(2000));
        assert!(g.try_begin(t0 + Duration::from_millis(3000)).is_ok());
    }
}
