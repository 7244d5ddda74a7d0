use crate::jobs::model::{JobRecord, JobStatus};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(JobStatus),
}

impl StatusFilter {
    pub fn matches(&self, job: &JobRecord) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(s) => job.status == *s,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::Only(s) => s.as_str(),
        }
    }

    /// 按 all → pending → running → completed → failed → cancelled 循环
    pub fn next(&self) -> Self {
        match self {
            StatusFilter::All => StatusFilter::Only(JobStatus::Pending),
            StatusFilter::Only(JobStatus::Pending) => StatusFilter::Only(JobStatus::Running),
            StatusFilter::Only(JobStatus::Running) => StatusFilter::Only(JobStatus::Completed),
            StatusFilter::Only(JobStatus::Completed) => StatusFilter::Only(JobStatus::Failed),
            StatusFilter::Only(JobStatus::Failed) => StatusFilter::Only(JobStatus::Cancelled),
            StatusFilter::Only(JobStatus::Cancelled) => StatusFilter::All,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(StatusFilter::All);
        }
        JobStatus::from_str(s).map(StatusFilter::Only)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    CreatedAt,
    StartedAt,
    CompletedAt,
    StrategyName,
    Status,
    Progress,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::CreatedAt => "created_at",
            SortKey::StartedAt => "started_at",
            SortKey::CompletedAt => "completed_at",
            SortKey::StrategyName => "strategy_name",
            SortKey::Status => "status",
            SortKey::Progress => "progress",
        }
    }

    pub fn next(&self) -> Self {
        match self {
            SortKey::CreatedAt => SortKey::StartedAt,
            SortKey::StartedAt => SortKey::CompletedAt,
            SortKey::CompletedAt => SortKey::StrategyName,
            SortKey::StrategyName => SortKey::Status,
            SortKey::Status => SortKey::Progress,
            SortKey::Progress => SortKey::CreatedAt,
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" | "created_at" => Ok(SortKey::CreatedAt),
            "started" | "started_at" => Ok(SortKey::StartedAt),
            "completed" | "completed_at" => Ok(SortKey::CompletedAt),
            "name" | "strategy" | "strategy_name" => Ok(SortKey::StrategyName),
            "status" => Ok(SortKey::Status),
            "progress" => Ok(SortKey::Progress),
            other => Err(format!("未知的排序字段: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn toggle(&self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "oldest" => Ok(SortOrder::Asc),
            "desc" | "newest" => Ok(SortOrder::Desc),
            other => Err(format!("未知的排序方向: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Projection {
    pub filter: StatusFilter,
    pub sort_key: SortKey,
    pub sort_order: SortOrder,
}

impl Projection {
    pub fn apply<'a>(&self, jobs: impl IntoIterator<Item = &'a JobRecord>) -> Vec<JobRecord> {
        project(jobs, self.filter, self.sort_key, self.sort_order)
    }
}

fn date_or_epoch(v: Option<DateTime<Utc>>) -> DateTime<Utc> {
    // DateTime<Utc> 的默认值即 1970-01-01T00:00:00Z
    v.unwrap_or_default()
}

fn compare_by(key: SortKey, a: &JobRecord, b: &JobRecord) -> Ordering {
    match key {
        SortKey::CreatedAt => date_or_epoch(a.created()).cmp(&date_or_epoch(b.created())),
        SortKey::StartedAt => date_or_epoch(a.started()).cmp(&date_or_epoch(b.started())),
        SortKey::CompletedAt => date_or_epoch(a.completed()).cmp(&date_or_epoch(b.completed())),
        SortKey::StrategyName => {
            let an = a.strategy_name.as_deref().unwrap_or("").to_lowercase();
            let bn = b.strategy_name.as_deref().unwrap_or("").to_lowercase();
            an.cmp(&bn)
        }
        SortKey::Status => a.status.as_str().cmp(b.status.as_str()),
        SortKey::Progress => a.progress_pct().total_cmp(&b.progress_pct()),
    }
}

/// 过滤 + 排序。缺失或无法解析的日期按 epoch 处理，字符串大小写不敏感。
pub fn project<'a>(
    jobs: impl IntoIterator<Item = &'a JobRecord>,
    filter: StatusFilter,
    key: SortKey,
    order: SortOrder,
) -> Vec<JobRecord> {
    let mut out: Vec<JobRecord> = jobs
        .into_iter()
        .filter(|j| filter.matches(j))
        .cloned()
        .collect();
    out.sort_by(|a, b| {
        let ord = compare_by(key, a, b);
        match order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::model::tests::job;

    fn sample() -> Vec<JobRecord> {
        let mut a = job("a", JobStatus::Running);
        a.strategy_name = Some("beta".into());
        a.created_at = Some("2024-03-01T00:00:00Z".into());
        a.started_at = Some("2024-03-01T00:05:00Z".into());
        a.progress = Some(40.0);

        let mut b = job("b", JobStatus::Completed);
        b.strategy_name = Some("Alpha".into());
        b.created_at = Some("2024-01-01T00:00:00Z".into());
        b.started_at = Some("2024-01-01T00:01:00Z".into());
        b.completed_at = Some("2024-01-01T01:00:00Z".into());
        b.progress = Some(100.0);

        let mut c = job("c", JobStatus::Pending);
        c.strategy_name = Some("gamma".into());
        c.created_at = Some("garbage".into());

        let mut d = job("d", JobStatus::Failed);
        d.strategy_name = Some("Delta".into());
        d.created_at = Some("2024-02-01T00:00:00Z".into());
        d.progress = Some(12.5);

        vec![a, b, c, d]
    }

    fn ids(v: &[JobRecord]) -> Vec<&str> {
        v.iter().map(|j| j.job_id.as_str()).collect()
    }

    #[test]
    fn filter_by_status_keeps_only_matching() {
        let jobs = sample();
        for s in JobStatus::ALL {
            let out = project(&jobs, StatusFilter::Only(s), SortKey::CreatedAt, SortOrder::Asc);
            assert!(out.iter().all(|j| j.status == s));
        }
        let all = project(&jobs, StatusFilter::All, SortKey::CreatedAt, SortOrder::Asc);
        assert_eq!(all.len(), jobs.len());
    }

    #[test]
    fn missing_dates_sort_as_epoch() {
        let jobs = sample();
        let asc = project(&jobs, StatusFilter::All, SortKey::CreatedAt, SortOrder::Asc);
        assert_eq!(ids(&asc), vec!["c", "b", "d", "a"]);

        let started = project(&jobs, StatusFilter::All, SortKey::StartedAt, SortOrder::Desc);
        // c、d 没有 started_at，统一落在末尾
        assert_eq!(ids(&started)[..2], ["a", "b"]);
        assert!(ids(&started)[2..].contains(&"c"));
        assert!(ids(&started)[2..].contains(&"d"));
    }

    #[test]
    fn names_sort_case_insensitively() {
        let jobs = sample();
        let out = project(&jobs, StatusFilter::All, SortKey::StrategyName, SortOrder::Asc);
        assert_eq!(ids(&out), vec!["b", "a", "d", "c"]);
    }

    #[test]
    fn reversed_order_is_exact_reverse_without_ties() {
        let jobs = sample();
        for key in [
            SortKey::CreatedAt,
            SortKey::StrategyName,
            SortKey::Status,
            SortKey::Progress,
        ] {
            let asc = project(&jobs, StatusFilter::All, key, SortOrder::Asc);
            let mut desc = project(&jobs, StatusFilter::All, key, SortOrder::Desc);
            desc.reverse();
            assert_eq!(ids(&asc), ids(&desc), "key {:?}", key);
        }
    }

    #[test]
    fn progress_sort_handles_missing_and_nan() {
        let mut jobs = sample();
        jobs[2].progress = Some(f64::NAN);
        let out = project(&jobs, StatusFilter::All, SortKey::Progress, SortOrder::Desc);
        assert_eq!(ids(&out), vec!["b", "a", "d", "c"]);
    }

    #[test]
    fn parses_filter_and_sort_tokens() {
        assert_eq!("ALL".parse::<StatusFilter>(), Ok(StatusFilter::All));
        assert_eq!(
            "running".parse::<StatusFilter>(),
            Ok(StatusFilter::Only(JobStatus::Running))
        );
        assert!("paused".parse::<StatusFilter>().is_err());
        assert_eq!("name".parse::<SortKey>(), Ok(SortKey::StrategyName));
        assert_eq!("oldest".parse::<SortOrder>(), Ok(SortOrder::Asc));
    }

    #[test]
    fn filter_cycle_returns_to_all() {
        let mut f = StatusFilter::All;
        for _ in 0..6 {
            f = f.next();
        }
        assert_eq!(f, StatusFilter::All);
    }
}
