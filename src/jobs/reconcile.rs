use crate::jobs::model::{JobRecord, JobStatus};
use tokio::time::{Duration, Instant};

/// toast 自动消失时间
pub const TOAST_TTL: Duration = Duration::from_millis(5000);

pub const REFRESH_FAILED_TOAST: &str = "无法刷新任务状态，正在自动重试...";

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub message: String,
    pub expires_at: Instant,
}

impl Toast {
    pub fn new(message: impl Into<String>, now: Instant) -> Self {
        Self {
            message: message.into(),
            expires_at: now + TOAST_TTL,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// 乐观取消的临时写入，等待下一次成功拉取确认或回滚
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionalCancel {
    pub prior_status: JobStatus,
    /// 标记时最近一次已发起拉取的序号。序号不大于它的拉取早于取消请求，不参与裁决
    pub after_fetch: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobEntry {
    pub record: JobRecord,
    pub provisional: Option<ProvisionalCancel>,
}

impl JobEntry {
    fn confirmed(record: JobRecord) -> Self {
        Self {
            record,
            provisional: None,
        }
    }
}

/// 一次成功拉取对乐观写入的裁决结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Confirmed { job_id: String },
    Reverted { job_id: String, server_status: JobStatus },
    Vanished { job_id: String },
    /// 拉取早于取消发起，结果不作数，继续保持取消状态
    Deferred { job_id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailureOutcome {
    /// 从未成功加载过：阻塞式错误页
    Blocking,
    /// 已经加载过：保留旧列表，弹出 toast
    Toast,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CancelRejection {
    UnknownJob,
    AlreadyTerminal(JobStatus),
}

/// 客户端持有的任务列表及其展示状态
#[derive(Debug, Clone, Default)]
pub struct JobListState {
    entries: Vec<JobEntry>,
    has_loaded: bool,
    loading: bool,
    error: Option<String>,
    toast: Option<Toast>,
}

impl JobListState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> impl Iterator<Item = &JobRecord> {
        self.entries.iter().map(|e| &e.record)
    }

    pub fn snapshot(&self) -> Vec<JobRecord> {
        self.records().cloned().collect()
    }

    pub fn entries(&self) -> &[JobEntry] {
        &self.entries
    }

    pub fn get(&self, job_id: &str) -> Option<&JobEntry> {
        self.entries.iter().find(|e| e.record.job_id == job_id)
    }

    pub fn has_loaded(&self) -> bool {
        self.has_loaded
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn toast(&self) -> Option<&Toast> {
        self.toast.as_ref()
    }

    /// 开始一次拉取：清除旧 toast；仅非静默拉取显示 loading
    pub fn begin_fetch(&mut self, show_loading: bool) {
        self.toast = None;
        if show_loading {
            self.loading = true;
        }
    }

    /// 成功：整体替换列表，清除错误与 toast，has_loaded 永久置真。
    /// `fetch_seq` 是这次拉取发起时的序号，用来识别取消之前就已在途的旧结果。
    pub fn apply_success(&mut self, jobs: Vec<JobRecord>, fetch_seq: u64) -> Vec<Resolution> {
        let mut resolutions = Vec::new();
        let mut carried = Vec::new();
        for old in &self.entries {
            let Some(provisional) = old.provisional else {
                continue;
            };
            let id = old.record.job_id.clone();
            match jobs.iter().find(|j| j.job_id == id) {
                Some(fresh) if fresh.status == JobStatus::Cancelled => {
                    resolutions.push(Resolution::Confirmed { job_id: id })
                }
                Some(_) if fetch_seq <= provisional.after_fetch => {
                    carried.push((id.clone(), provisional));
                    resolutions.push(Resolution::Deferred { job_id: id });
                }
                Some(fresh) => resolutions.push(Resolution::Reverted {
                    job_id: id,
                    server_status: fresh.status,
                }),
                None => resolutions.push(Resolution::Vanished { job_id: id }),
            }
        }

        self.entries = jobs
            .into_iter()
            .map(|mut record| {
                match carried.iter().find(|(id, _)| *id == record.job_id) {
                    Some((_, provisional)) => {
                        record.status = JobStatus::Cancelled;
                        JobEntry {
                            record,
                            provisional: Some(*provisional),
                        }
                    }
                    None => JobEntry::confirmed(record),
                }
            })
            .collect();
        self.has_loaded = true;
        self.loading = false;
        self.error = None;
        self.toast = None;
        resolutions
    }

    pub fn apply_failure(&mut self, message: impl Into<String>, now: Instant) -> FailureOutcome {
        self.loading = false;
        if self.has_loaded {
            self.toast = Some(Toast::new(REFRESH_FAILED_TOAST, now));
            FailureOutcome::Toast
        } else {
            self.entries.clear();
            self.error = Some(message.into());
            FailureOutcome::Blocking
        }
    }

    /// 乐观取消：只改 status，其余字段不动
    pub fn mark_cancelled(
        &mut self,
        job_id: &str,
        after_fetch: u64,
    ) -> Result<ProvisionalCancel, CancelRejection> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.record.job_id == job_id)
            .ok_or(CancelRejection::UnknownJob)?;
        if entry.record.status.is_terminal() {
            return Err(CancelRejection::AlreadyTerminal(entry.record.status));
        }
        let provisional = ProvisionalCancel {
            prior_status: entry.record.status,
            after_fetch,
        };
        entry.record.status = JobStatus::Cancelled;
        entry.provisional = Some(provisional);
        Ok(provisional)
    }

    /// 用单个任务的最新快照覆盖列表中的同 ID 记录；列表中没有的记录忽略
    pub fn merge(&mut self, record: JobRecord) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|e| e.record.job_id == record.job_id)
        {
            Some(entry) => {
                *entry = JobEntry::confirmed(record);
                true
            }
            None => false,
        }
    }

    pub fn show_toast(&mut self, message: impl Into<String>, now: Instant) {
        self.toast = Some(Toast::new(message, now));
    }

    pub fn dismiss_toast(&mut self) {
        self.toast = None;
    }

    /// 清理过期 toast，返回是否有变化
    pub fn expire_toast(&mut self, now: Instant) -> bool {
        if self.toast.as_ref().is_some_and(|t| t.is_expired(now)) {
            self.toast = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::model::tests::job;

    fn running(id: &str, progress: f64) -> JobRecord {
        let mut j = job(id, JobStatus::Running);
        j.progress = Some(progress);
        j
    }

    #[test]
    fn success_sets_has_loaded_permanently() {
        let now = Instant::now();
        let mut st = JobListState::new();
        st.apply_success(vec![], 1);
        assert!(st.has_loaded());
        for _ in 0..3 {
            assert_eq!(st.apply_failure("down", now), FailureOutcome::Toast);
        }
        assert!(st.has_loaded());
        assert!(st.error().is_none());
    }

    #[test]
    fn failure_before_first_load_is_blocking() {
        let mut st = JobListState::new();
        let outcome = st.apply_failure("connection refused", Instant::now());
        assert_eq!(outcome, FailureOutcome::Blocking);
        assert_eq!(st.error(), Some("connection refused"));
        assert!(st.snapshot().is_empty());
        assert!(st.toast().is_none());
    }

    #[test]
    fn failure_after_load_keeps_list_and_toasts() {
        let now = Instant::now();
        let mut st = JobListState::new();
        st.apply_success(vec![running("1", 10.0), job("2", JobStatus::Completed)], 1);
        let before = st.snapshot();

        assert_eq!(st.apply_failure("timeout", now), FailureOutcome::Toast);
        assert_eq!(st.snapshot(), before);
        let toast = st.toast().unwrap();
        assert_eq!(toast.message, REFRESH_FAILED_TOAST);
        assert_eq!(toast.expires_at, now + TOAST_TTL);

        assert!(!st.expire_toast(now + Duration::from_millis(4999)));
        assert!(st.expire_toast(now + TOAST_TTL));
        assert!(st.toast().is_none());
    }

    #[test]
    fn success_clears_error_and_toast() {
        let now = Instant::now();
        let mut st = JobListState::new();
        st.apply_failure("x", now);
        st.apply_success(vec![job("1", JobStatus::Pending)], 1);
        assert!(st.error().is_none());
        st.apply_failure("y", now);
        assert!(st.toast().is_some());
        st.apply_success(vec![job("1", JobStatus::Pending)], 1);
        assert!(st.toast().is_none());
    }

    #[test]
    fn optimistic_cancel_only_touches_status() {
        let mut st = JobListState::new();
        st.apply_success(vec![running("42", 55.0)], 1);
        let p = st.mark_cancelled("42", 1).unwrap();
        assert_eq!(p.prior_status, JobStatus::Running);

        let entry = st.get("42").unwrap();
        assert_eq!(entry.record.status, JobStatus::Cancelled);
        assert_eq!(entry.record.progress, Some(55.0));
        assert!(entry.provisional.is_some());
    }

    #[test]
    fn cancel_rejects_unknown_and_terminal_jobs() {
        let mut st = JobListState::new();
        st.apply_success(vec![job("1", JobStatus::Completed)], 1);
        assert_eq!(st.mark_cancelled("9", 1), Err(CancelRejection::UnknownJob));
        assert_eq!(
            st.mark_cancelled("1", 1),
            Err(CancelRejection::AlreadyTerminal(JobStatus::Completed))
        );
    }

    #[test]
    fn next_fetch_confirms_or_reverts_provisional_cancel() {
        let mut st = JobListState::new();
        st.apply_success(vec![job("a", JobStatus::Pending), running("b", 90.0)], 1);
        st.mark_cancelled("a", 1).unwrap();
        st.mark_cancelled("b", 1).unwrap();

        let mut b_done = job("b", JobStatus::Completed);
        b_done.result_backtest_id = Some("bt-1".into());
        let res = st.apply_success(vec![job("a", JobStatus::Cancelled), b_done], 2);

        assert!(res.contains(&Resolution::Confirmed { job_id: "a".into() }));
        assert!(res.contains(&Resolution::Reverted {
            job_id: "b".into(),
            server_status: JobStatus::Completed
        }));
        assert_eq!(st.get("b").unwrap().record.status, JobStatus::Completed);
        assert!(st.entries().iter().all(|e| e.provisional.is_none()));
    }

    #[test]
    fn fetch_issued_before_cancel_cannot_revert_it() {
        let mut st = JobListState::new();
        st.apply_success(vec![running("7", 40.0)], 1);
        // 第 2 次拉取已在途时发起取消
        st.mark_cancelled("7", 2).unwrap();

        let res = st.apply_success(vec![running("7", 55.0)], 2);
        assert_eq!(res, vec![Resolution::Deferred { job_id: "7".into() }]);
        let entry = st.get("7").unwrap();
        assert_eq!(entry.record.status, JobStatus::Cancelled);
        assert_eq!(entry.record.progress, Some(55.0));
        assert!(entry.provisional.is_some());

        let res = st.apply_success(vec![running("7", 60.0)], 3);
        assert_eq!(
            res,
            vec![Resolution::Reverted {
                job_id: "7".into(),
                server_status: JobStatus::Running
            }]
        );
        assert!(st.get("7").unwrap().provisional.is_none());
    }

    #[test]
    fn merge_replaces_known_record_only() {
        let mut st = JobListState::new();
        st.apply_success(vec![running("1", 20.0)], 1);
        st.mark_cancelled("1", 1).unwrap();

        let mut done = job("1", JobStatus::Completed);
        done.result_backtest_id = Some("bt-1".into());
        assert!(st.merge(done));
        let entry = st.get("1").unwrap();
        assert_eq!(entry.record.result_id(), Some("bt-1"));
        assert!(entry.provisional.is_none());

        assert!(!st.merge(job("2", JobStatus::Running)));
        assert_eq!(st.snapshot().len(), 1);
    }

    #[test]
    fn begin_fetch_clears_toast_and_tracks_loading() {
        let now = Instant::now();
        let mut st = JobListState::new();
        st.apply_success(vec![], 1);
        st.show_toast("hi", now);
        st.begin_fetch(false);
        assert!(st.toast().is_none());
        assert!(!st.is_loading());
        st.begin_fetch(true);
        assert!(st.is_loading());
        st.apply_failure("x", now);
        assert!(!st.is_loading());
    }
}
