use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::lenient;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// pending / running 视为活跃任务，决定轮询节奏
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" | "done" => Ok(JobStatus::Completed),
            "failed" | "error" => Ok(JobStatus::Failed),
            "cancelled" | "canceled" => Ok(JobStatus::Cancelled),
            other => Err(format!("未知的任务状态: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// 后端返回的回测任务记录。除 job_id / status 外均可缺省；
/// 可选字段为 null 或类型不符时按缺省处理，不影响整个列表。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    #[serde(deserialize_with = "lenient::id_as_string")]
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub progress: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub priority: Option<JobPriority>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub strategy_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub strategy_description: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub timeframe: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub assets: Vec<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub period: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub initial_capital: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub started_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub completed_at: Option<String>,
    /// 秒，后端可能给小数
    #[serde(default, deserialize_with = "lenient::opt")]
    pub estimated_duration: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub actual_duration: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub error_message: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub result_backtest_id: Option<String>,
}

impl JobRecord {
    /// 显示用进度，钳制到 [0, 100]
    pub fn progress_pct(&self) -> f64 {
        match self.progress {
            Some(p) if p.is_finite() => p.clamp(0.0, 100.0),
            _ => 0.0,
        }
    }

    pub fn display_name(&self) -> &str {
        self.strategy_name.as_deref().unwrap_or("N/A")
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.created_at.as_deref())
    }

    pub fn started(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.started_at.as_deref())
    }

    pub fn completed(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.completed_at.as_deref())
    }

    /// 已完成且带结果 ID 时可查看回测结果
    pub fn result_id(&self) -> Option<&str> {
        if self.status == JobStatus::Completed {
            self.result_backtest_id.as_deref()
        } else {
            None
        }
    }
}

/// 解析 ISO-8601 时间戳。后端（Python isoformat）可能不带时区，按 UTC 处理。
pub fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let s = raw?.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

pub fn format_timestamp(raw: Option<&str>) -> String {
    parse_timestamp(raw)
        .map(|dt| {
            dt.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "N/A".to_string())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobListResponse {
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub jobs: Vec<JobRecord>,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub total: Option<usize>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub user_id: String,
    pub strategy_name: String,
    pub strategy_description: String,
    pub timeframe: String,
    pub assets: Vec<String>,
    pub period: String,
    pub initial_capital: f64,
    pub strategy_definition: Value,
    pub priority: JobPriority,
}

impl CreateJobRequest {
    pub fn new(
        user_id: impl Into<String>,
        name: Option<String>,
        timeframe: impl Into<String>,
        assets: Vec<String>,
    ) -> Self {
        let strategy_name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "Untitled Strategy".to_string());
        let strategy_description = "No description".to_string();
        let timeframe = timeframe.into();
        let strategy_definition = serde_json::json!({
            "name": strategy_name,
            "description": strategy_description,
            "timeframe": timeframe,
            "assets": assets,
            "entry_conditions": { "conditions": [], "logic": "AND" },
            "exit_conditions": { "conditions": [], "logic": "AND" },
            "risk_management": {}
        });
        Self {
            user_id: user_id.into(),
            strategy_name,
            strategy_description,
            timeframe,
            assets,
            period: "6 months".to_string(),
            initial_capital: 10_000.0,
            strategy_definition,
            priority: JobPriority::Normal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobResponse {
    pub job_id: String,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub message: Option<String>,
}

/// 绩效指标。mock 数据用 camelCase，真实接口用 snake_case，两种都接受
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PerformanceMetrics {
    #[serde(default, alias = "winRate", deserialize_with = "lenient::opt")]
    pub win_rate: Option<f64>,
    #[serde(default, alias = "profitFactor", deserialize_with = "lenient::opt")]
    pub profit_factor: Option<f64>,
    #[serde(default, alias = "totalTrades", deserialize_with = "lenient::opt")]
    pub total_trades: Option<i64>,
    #[serde(default, alias = "avgReturn", deserialize_with = "lenient::opt")]
    pub avg_return: Option<f64>,
    #[serde(default, alias = "maxDrawdown", deserialize_with = "lenient::opt")]
    pub max_drawdown: Option<f64>,
    #[serde(default, alias = "sharpeRatio", deserialize_with = "lenient::opt")]
    pub sharpe_ratio: Option<f64>,
    #[serde(default, alias = "sortinoRatio", deserialize_with = "lenient::opt")]
    pub sortino_ratio: Option<f64>,
    #[serde(default, alias = "calmarRatio", deserialize_with = "lenient::opt")]
    pub calmar_ratio: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChartDataset {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub label: String,
    #[serde(default, deserialize_with = "lenient::number_list")]
    pub data: Vec<f64>,
}

/// 图表数据：labels + 若干数据序列
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChartData {
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub labels: Vec<String>,
    #[serde(default, deserialize_with = "lenient::valid_items")]
    pub datasets: Vec<ChartDataset>,
}

impl ChartData {
    /// 所有序列的 (min, max)，无有效数据时返回 None
    pub fn bounds(&self) -> Option<(f64, f64)> {
        let mut it = self
            .datasets
            .iter()
            .flat_map(|d| d.data.iter().copied())
            .filter(|v| v.is_finite());
        let first = it.next()?;
        Some(it.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }

    pub fn max_len(&self) -> usize {
        self.datasets
            .iter()
            .map(|d| d.data.len())
            .max()
            .unwrap_or(0)
            .max(self.labels.len())
    }
}

/// 回测结果。也用于"我的回测"列表项
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BacktestResult {
    #[serde(deserialize_with = "lenient::id_as_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub timeframe: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub assets: Vec<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub period: Option<String>,
    #[serde(default, alias = "initialCapital", deserialize_with = "lenient::opt")]
    pub initial_capital: Option<f64>,
    #[serde(default, alias = "finalCapital", deserialize_with = "lenient::opt")]
    pub final_capital: Option<f64>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub performance: PerformanceMetrics,
    #[serde(default, alias = "chartData", deserialize_with = "lenient::or_default")]
    pub chart_data: ChartData,
    #[serde(default, alias = "createdAt", deserialize_with = "lenient::opt_string")]
    pub created_at: Option<String>,
}

impl BacktestResult {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("N/A")
    }

    /// 总收益率（%），缺少资金数据时为 None
    pub fn total_return_pct(&self) -> Option<f64> {
        match (self.initial_capital, self.final_capital) {
            (Some(i), Some(f)) if i > 0.0 && f.is_finite() => Some((f / i - 1.0) * 100.0),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl JobStats {
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a JobRecord>) -> Self {
        let mut stats = JobStats::default();
        for job in jobs {
            stats.total += 1;
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    pub fn count(&self, status: JobStatus) -> usize {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::Running => self.running,
            JobStatus::Completed => self.completed,
            JobStatus::Failed => self.failed,
            JobStatus::Cancelled => self.cancelled,
        }
    }

    pub fn active(&self) -> usize {
        self.pending + self.running
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn job(id: &str, status: JobStatus) -> JobRecord {
        JobRecord {
            job_id: id.to_string(),
            status,
            progress: None,
            user_id: None,
            priority: None,
            strategy_name: None,
            strategy_description: None,
            timeframe: None,
            assets: Vec::new(),
            period: None,
            initial_capital: None,
            created_at: None,
            started_at: None,
            completed_at: None,
            estimated_duration: None,
            actual_duration: None,
            error_message: None,
            result_backtest_id: None,
        }
    }

    #[test]
    fn decodes_backend_job_with_missing_fields() {
        let raw = r#"{
            "jobs": [
                {"job_id": "job_1", "status": "running", "progress": 40.0,
                 "strategy_name": "RSI Reversal", "assets": ["BTC", "ETH"],
                 "created_at": "2024-05-01T10:00:00.123456"},
                {"job_id": "job_2", "status": "failed", "error_message": "boom"}
            ],
            "total": 2,
            "user_id": "u1"
        }"#;
        let resp: JobListResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.jobs.len(), 2);
        assert_eq!(resp.jobs[0].status, JobStatus::Running);
        assert_eq!(resp.jobs[0].progress_pct(), 40.0);
        assert!(resp.jobs[0].created().is_some());
        assert_eq!(resp.jobs[1].display_name(), "N/A");
        assert_eq!(resp.jobs[1].error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn odd_optional_fields_do_not_fail_the_list() {
        let raw = r#"{
            "jobs": [
                {"job_id": "1", "status": "running", "assets": null},
                {"job_id": 2, "status": "completed", "user_id": 17,
                 "actual_duration": 12.5, "estimated_duration": "soon",
                 "priority": "whenever", "progress": null,
                 "result_backtest_id": 99}
            ],
            "total": "2",
            "user_id": 17
        }"#;
        let resp: JobListResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.jobs.len(), 2);
        assert!(resp.jobs[0].assets.is_empty());

        let done = &resp.jobs[1];
        assert_eq!(done.job_id, "2");
        assert_eq!(done.user_id.as_deref(), Some("17"));
        assert_eq!(done.actual_duration, Some(12.5));
        assert_eq!(done.estimated_duration, None);
        assert_eq!(done.priority, None);
        assert_eq!(done.progress_pct(), 0.0);
        assert_eq!(done.result_id(), Some("99"));
        assert_eq!(resp.total, None);
        assert_eq!(resp.user_id.as_deref(), Some("17"));
    }

    #[test]
    fn backtest_result_accepts_camel_case_and_null_sections() {
        let raw = r#"{"id": 5, "initialCapital": 1000, "finalCapital": 1250.0,
            "performance": {"winRate": 61.5, "total_trades": 40},
            "chart_data": {"labels": ["a", "b"],
                           "datasets": [{"label": "Equity", "data": [1000, null]}, 3]}}"#;
        let r: BacktestResult = serde_json::from_str(raw).unwrap();
        assert_eq!(r.id, "5");
        assert_eq!(r.performance.win_rate, Some(61.5));
        assert_eq!(r.performance.total_trades, Some(40));
        assert_eq!(r.total_return_pct(), Some(25.0));
        assert_eq!(r.chart_data.datasets.len(), 1);
        assert_eq!(r.chart_data.bounds(), Some((1000.0, 1000.0)));

        let bare: BacktestResult =
            serde_json::from_str(r#"{"id": "x", "performance": null, "chart_data": null}"#)
                .unwrap();
        assert_eq!(bare.performance, PerformanceMetrics::default());
        assert_eq!(bare.total_return_pct(), None);
    }

    #[test]
    fn missing_jobs_key_is_empty_list() {
        let resp: JobListResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.jobs.is_empty());
        let resp: JobListResponse = serde_json::from_str(r#"{"jobs": null}"#).unwrap();
        assert!(resp.jobs.is_empty());
    }

    #[test]
    fn unknown_status_is_rejected() {
        let raw = r#"{"job_id": "x", "status": "paused"}"#;
        assert!(serde_json::from_str::<JobRecord>(raw).is_err());
    }

    #[test]
    fn progress_is_clamped() {
        let mut j = job("a", JobStatus::Running);
        j.progress = Some(180.0);
        assert_eq!(j.progress_pct(), 100.0);
        j.progress = Some(f64::NAN);
        assert_eq!(j.progress_pct(), 0.0);
    }

    #[test]
    fn timestamps_tolerate_garbage() {
        assert!(parse_timestamp(Some("not a date")).is_none());
        assert!(parse_timestamp(Some("")).is_none());
        assert!(parse_timestamp(Some("2024-05-01T10:00:00Z")).is_some());
        assert_eq!(format_timestamp(None), "N/A");
    }

    #[test]
    fn result_id_only_for_completed() {
        let mut j = job("a", JobStatus::Running);
        j.result_backtest_id = Some("bt-9".into());
        assert!(j.result_id().is_none());
        j.status = JobStatus::Completed;
        assert_eq!(j.result_id(), Some("bt-9"));
    }

    #[test]
    fn stats_count_each_status() {
        let jobs = vec![
            job("1", JobStatus::Pending),
            job("2", JobStatus::Running),
            job("3", JobStatus::Running),
            job("4", JobStatus::Cancelled),
        ];
        let stats = JobStats::from_jobs(&jobs);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.active(), 3);
        assert_eq!(stats.count(JobStatus::Cancelled), 1);
        assert_eq!(stats.completed, 0);
    }

    #[test]
    fn chart_bounds_skip_non_finite() {
        let chart = ChartData {
            labels: vec!["a".into(), "b".into()],
            datasets: vec![ChartDataset {
                label: "equity".into(),
                data: vec![3.0, f64::NAN, -1.0, 7.5],
            }],
        };
        assert_eq!(chart.bounds(), Some((-1.0, 7.5)));
        assert_eq!(chart.max_len(), 4);
        assert_eq!(ChartData::default().bounds(), None);
    }
}
