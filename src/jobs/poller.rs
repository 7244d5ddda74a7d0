use crate::api::{ApiError, JobsApi};
use crate::app_state::AppEvent;
use crate::jobs::guard::{RequestGuard, SkipReason};
use crate::jobs::model::JobRecord;
use crate::jobs::reconcile::{CancelRejection, FailureOutcome, JobListState, Resolution};
use crate::jobs::scheduler::{PollMode, PollScheduler};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// 推送给 UI 的任务列表快照
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobsView {
    pub jobs: Vec<JobRecord>,
    /// 乐观取消、尚未被服务端确认的任务
    pub pending_confirmation: Vec<String>,
    pub has_loaded: bool,
    pub loading: bool,
    pub error: Option<String>,
    pub toast: Option<String>,
    pub mode: Option<PollMode>,
    pub polling: bool,
}

#[derive(Debug, Clone)]
enum PollMsg {
    Tick,
    Refresh { show_loading: bool },
    FetchDone {
        seq: u64,
        result: Result<Vec<JobRecord>, ApiError>,
    },
    Cancel(String),
    CancelDone {
        job_id: String,
        result: Result<(), ApiError>,
    },
    Merge(JobRecord),
    DismissToast,
    ExpireToast,
    Shutdown,
}

/// 任务轮询 actor 的句柄。Drop 时关闭 actor（定时器一并清理）。
pub struct PollerHandle {
    tx: mpsc::UnboundedSender<PollMsg>,
    task: Option<JoinHandle<()>>,
}

/// actor 的轻量引用，可跨任务持有：watcher 回写快照，提交任务后触发静默刷新。
/// actor 关闭后发送静默失败。
#[derive(Clone)]
pub struct PollerLink {
    tx: mpsc::UnboundedSender<PollMsg>,
}

impl PollerLink {
    pub fn merge(&self, record: JobRecord) {
        let _ = self.tx.send(PollMsg::Merge(record));
    }

    pub fn refresh(&self, show_loading: bool) {
        let _ = self.tx.send(PollMsg::Refresh { show_loading });
    }
}

impl PollerHandle {
    /// 启动轮询 actor，并立即发起首次（显示 loading 的）拉取
    pub fn spawn(
        api: Arc<dyn JobsApi>,
        user_id: impl Into<String>,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let poller = JobsPoller {
            api,
            user_id: user_id.into(),
            state: JobListState::new(),
            guard: RequestGuard::default(),
            scheduler: PollScheduler::new(tx.clone(), PollMsg::Tick),
            self_tx: tx.clone(),
            events,
            toast_timer: None,
            deferred_toast: None,
            fetch_seq: 0,
        };
        let task = tokio::spawn(poller.run(rx));
        let _ = tx.send(PollMsg::Refresh { show_loading: true });
        Self {
            tx,
            task: Some(task),
        }
    }

    /// 手动刷新 / 重试，同样受请求守卫约束
    pub fn refresh(&self, show_loading: bool) {
        let _ = self.tx.send(PollMsg::Refresh { show_loading });
    }

    pub fn cancel(&self, job_id: impl Into<String>) {
        let _ = self.tx.send(PollMsg::Cancel(job_id.into()));
    }

    pub fn dismiss_toast(&self) {
        let _ = self.tx.send(PollMsg::DismissToast);
    }

    pub fn link(&self) -> PollerLink {
        PollerLink {
            tx: self.tx.clone(),
        }
    }

    /// 关闭 actor 并等待其退出
    pub async fn shutdown(mut self) {
        let _ = self.tx.send(PollMsg::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        let _ = self.tx.send(PollMsg::Shutdown);
    }
}

struct JobsPoller {
    api: Arc<dyn JobsApi>,
    user_id: String,
    state: JobListState,
    guard: RequestGuard,
    scheduler: PollScheduler<PollMsg>,
    self_tx: mpsc::UnboundedSender<PollMsg>,
    events: mpsc::UnboundedSender<AppEvent>,
    toast_timer: Option<JoinHandle<()>>,
    /// 取消失败的提示，等对账拉取结束后再显示，避免被成功对账清掉
    deferred_toast: Option<String>,
    /// 已发起的列表拉取序号，单调递增
    fetch_seq: u64,
}

impl JobsPoller {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<PollMsg>) {
        info!("任务轮询启动 [user: {}]", self.user_id);
        while let Some(msg) = rx.recv().await {
            match msg {
                PollMsg::Tick => {
                    self.fetch(false);
                }
                PollMsg::Refresh { show_loading } => {
                    self.fetch(show_loading);
                }
                PollMsg::FetchDone { seq, result } => self.on_fetched(seq, result),
                PollMsg::Cancel(job_id) => self.cancel(job_id),
                PollMsg::CancelDone { job_id, result } => self.on_cancelled(job_id, result),
                PollMsg::Merge(record) => {
                    let id = record.job_id.clone();
                    if self.state.merge(record) {
                        debug!("合并任务快照 {}", id);
                        // 单条快照不重置节奏，只有模式变化才重新布置
                        self.scheduler.rearm_if_changed(self.state.records());
                        self.publish();
                    }
                }
                PollMsg::DismissToast => {
                    self.state.dismiss_toast();
                    self.publish();
                }
                PollMsg::ExpireToast => {
                    if self.state.expire_toast(Instant::now()) {
                        self.publish();
                    }
                }
                PollMsg::Shutdown => break,
            }
        }
        self.scheduler.disarm();
        if let Some(timer) = self.toast_timer.take() {
            timer.abort();
        }
        info!("任务轮询停止 [user: {}]", self.user_id);
    }

    /// 发起一次列表拉取；被守卫跳过时返回 false
    fn fetch(&mut self, show_loading: bool) -> bool {
        if let Err(reason) = self.guard.try_begin(Instant::now()) {
            debug!("跳过任务列表拉取: {:?}", reason);
            if show_loading {
                let hint = match reason {
                    SkipReason::InFlight => "⚠ 上一次刷新尚未完成",
                    SkipReason::RateLimited => "⚠ 刷新过于频繁，请 3 秒后再试",
                };
                let _ = self.events.send(AppEvent::Log(hint.to_string()));
            }
            return false;
        }

        self.state.begin_fetch(show_loading);
        self.publish();

        self.fetch_seq += 1;
        let seq = self.fetch_seq;
        let api = Arc::clone(&self.api);
        let user_id = self.user_id.clone();
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            let result = api.list_user_jobs(&user_id).await.map(|resp| resp.jobs);
            let _ = tx.send(PollMsg::FetchDone { seq, result });
        });
        true
    }

    fn on_fetched(&mut self, seq: u64, result: Result<Vec<JobRecord>, ApiError>) {
        self.guard.finish();
        match result {
            Ok(jobs) => {
                let count = jobs.len();
                for resolution in self.state.apply_success(jobs, seq) {
                    match resolution {
                        Resolution::Confirmed { job_id } => info!("取消已确认: {}", job_id),
                        Resolution::Reverted {
                            job_id,
                            server_status,
                        } => {
                            warn!("乐观取消被回滚: {} -> {}", job_id, server_status);
                            let _ = self.events.send(AppEvent::Log(format!(
                                "⚠ 任务 {} 未被取消，当前状态: {}",
                                job_id, server_status
                            )));
                        }
                        Resolution::Vanished { job_id } => {
                            warn!("乐观取消的任务已不在列表中: {}", job_id)
                        }
                        Resolution::Deferred { job_id } => {
                            debug!("拉取 #{} 早于取消 {}，等待下一次拉取确认", seq, job_id)
                        }
                    }
                }
                let mode = self.scheduler.rearm(self.state.records());
                debug!("拉取到 {} 个任务，轮询模式 {:?}", count, mode);
            }
            Err(e) => {
                let message = e.to_string();
                warn!("拉取任务列表失败: {}", message);
                match self.state.apply_failure(message.clone(), Instant::now()) {
                    FailureOutcome::Blocking => {
                        // 从未加载成功：停止轮询，等待手动重试
                        self.scheduler.disarm();
                        let _ = self
                            .events
                            .send(AppEvent::Error(format!("✗ 加载回测任务失败: {}", message)));
                    }
                    FailureOutcome::Toast => {
                        self.scheduler.rearm(self.state.records());
                        self.arm_toast_expiry();
                    }
                }
            }
        }

        if let Some(toast) = self.deferred_toast.take() {
            self.state.show_toast(toast, Instant::now());
            self.arm_toast_expiry();
        }
        self.publish();
    }

    fn cancel(&mut self, job_id: String) {
        match self.state.mark_cancelled(&job_id, self.fetch_seq) {
            Ok(provisional) => {
                info!(
                    "乐观取消 {} (原状态 {})",
                    job_id, provisional.prior_status
                );
            }
            Err(CancelRejection::UnknownJob) => {
                warn!("取消被拒绝，未知任务: {}", job_id);
                let _ = self
                    .events
                    .send(AppEvent::Error(format!("✗ 列表中没有任务 {}", job_id)));
                return;
            }
            Err(CancelRejection::AlreadyTerminal(status)) => {
                warn!("取消被拒绝，任务 {} 已结束: {}", job_id, status);
                let _ = self.events.send(AppEvent::Error(format!(
                    "✗ 任务 {} 已处于 {} 状态，无法取消",
                    job_id, status
                )));
                return;
            }
        }
        self.publish();

        let api = Arc::clone(&self.api);
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            let result = api.cancel_job(&job_id).await;
            let _ = tx.send(PollMsg::CancelDone { job_id, result });
        });
    }

    fn on_cancelled(&mut self, job_id: String, result: Result<(), ApiError>) {
        let failure = match result {
            Ok(()) => {
                let _ = self
                    .events
                    .send(AppEvent::Message(format!("✓ 已取消任务 {}", job_id)));
                None
            }
            Err(e) => {
                warn!("取消任务 {} 失败: {}", job_id, e);
                let msg = format!("取消任务失败: {}", e);
                let _ = self.events.send(AppEvent::Error(format!("✗ {}", msg)));
                Some(msg)
            }
        };

        // 无论成败都静默对账一次
        let started = self.fetch(false);
        if let Some(msg) = failure {
            if started {
                self.deferred_toast = Some(msg);
            } else {
                self.state.show_toast(msg, Instant::now());
                self.arm_toast_expiry();
            }
        }
        self.scheduler.rearm(self.state.records());
        self.publish();
    }

    fn arm_toast_expiry(&mut self) {
        if let Some(timer) = self.toast_timer.take() {
            timer.abort();
        }
        if let Some(toast) = self.state.toast() {
            let at = toast.expires_at;
            let tx = self.self_tx.clone();
            self.toast_timer = Some(tokio::spawn(async move {
                sleep_until(at).await;
                let _ = tx.send(PollMsg::ExpireToast);
            }));
        }
    }

    fn view(&self) -> JobsView {
        JobsView {
            jobs: self.state.snapshot(),
            pending_confirmation: self
                .state
                .entries()
                .iter()
                .filter(|e| e.provisional.is_some())
                .map(|e| e.record.job_id.clone())
                .collect(),
            has_loaded: self.state.has_loaded(),
            loading: self.state.is_loading(),
            error: self.state.error().map(|s| s.to_string()),
            toast: self.state.toast().map(|t| t.message.clone()),
            mode: self.scheduler.mode(),
            polling: self.scheduler.is_armed(),
        }
    }

    fn publish(&self) {
        let _ = self.events.send(AppEvent::Jobs(self.view()));
    }
}
