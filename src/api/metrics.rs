use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiMetrics {
    pub call_count: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub total_ms: f64,
}

impl ApiMetrics {
    pub fn average_ms(&self) -> Option<f64> {
        if self.call_count == 0 {
            None
        } else {
            Some(self.total_ms / self.call_count as f64)
        }
    }

    pub fn record(&mut self, elapsed: Duration, success: bool) {
        self.call_count += 1;
        self.total_ms += elapsed.as_secs_f64() * 1000.0;
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// API 调用指标的接收端，由创建方注入到客户端，随客户端一起释放
pub trait MetricsSink: Send + Sync {
    fn track_api_call(&self, elapsed: Duration, success: bool);
}

/// 累加到共享的 ApiMetrics，UI 侧读取快照
#[derive(Debug, Clone, Default)]
pub struct SharedMetrics {
    inner: Arc<Mutex<ApiMetrics>>,
}

impl SharedMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ApiMetrics {
        match self.inner.lock() {
            Ok(m) => m.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn reset(&self) {
        if let Ok(mut m) = self.inner.lock() {
            *m = ApiMetrics::default();
        }
    }
}

impl MetricsSink for SharedMetrics {
    fn track_api_call(&self, elapsed: Duration, success: bool) {
        if let Ok(mut m) = self.inner.lock() {
            m.record(elapsed, success);
        }
    }
}

pub fn format_ms(ms: Option<f64>) -> String {
    match ms {
        Some(v) if v.is_finite() && v >= 0.0 => {
            if v < 1000.0 {
                format!("{:.0}ms", v)
            } else {
                format!("{:.2}s", v / 1000.0)
            }
        }
        _ => "N/A".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_metrics_accumulate() {
        let m = SharedMetrics::new();
        m.track_api_call(Duration::from_millis(100), true);
        m.track_api_call(Duration::from_millis(300), false);
        let snap = m.snapshot();
        assert_eq!(snap.call_count, 2);
        assert_eq!(snap.succeeded, 1);
        assert_eq!(snap.failed, 1);
        assert!((snap.average_ms().unwrap() - 200.0).abs() < 1e-6);

        m.reset();
        assert_eq!(m.snapshot(), ApiMetrics::default());
    }

    #[test]
    fn formats_latency() {
        assert_eq!(format_ms(None), "N/A");
        assert_eq!(format_ms(Some(-1.0)), "N/A");
        assert_eq!(format_ms(Some(250.4)), "250ms");
        assert_eq!(format_ms(Some(1500.0)), "1.50s");
    }
}
