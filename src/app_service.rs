use crate::api::{
    ApiClient, ApiError, Backend, MetricsSink, MockBackend, SharedMetrics, SignalsApi,
};
use crate::app_state::AppEvent;
use crate::commands::{AppCommand, SignalArgs, SubmitArgs, HELP_TEXT};
use crate::config::AppConfig;
use crate::jobs::model::CreateJobRequest;
use crate::jobs::{spawn_watcher, PollerHandle};
use crate::signals::{FeedQuery, SignalDraft, SignalStatus, SignalUpdate};
use crate::storage::repository::{SessionRepository, SessionUser, StoredSession};
use log::{debug, info, warn};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

const METRICS_PUBLISH_INTERVAL: Duration = Duration::from_secs(2);

const ANONYMOUS_HINT: &str =
    "⚠ 未登录：使用 login <user_id> <token> [name] 登录后查看回测任务和信号";

/// 后台命令 actor：持有后端客户端、任务轮询、单任务跟踪和会话。
/// 网络请求都放到独立任务里，actor 本身不等待后端。
pub struct AppService {
    config: AppConfig,
    db: Arc<DatabaseConnection>,
    metrics: SharedMetrics,
    /// 不随 token 重建的共享后端（mock 模式）
    shared: Option<Backend>,
    backend: Backend,
    session: Option<StoredSession>,
    poller: Option<PollerHandle>,
    watcher: Option<JoinHandle<()>>,
    metrics_task: Option<JoinHandle<()>>,
    events: mpsc::UnboundedSender<AppEvent>,
}

impl AppService {
    pub fn new(
        config: AppConfig,
        db: Arc<DatabaseConnection>,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Result<Self, ApiError> {
        let shared = config.use_mock_api.then(|| {
            Backend::new(Arc::new(match config.mock_seed {
                Some(seed) => MockBackend::with_seed(seed),
                None => MockBackend::new(),
            }))
        });
        Self::with_backend(config, db, shared, events)
    }

    /// `shared` 为 Some 时所有会话共用该后端，否则按 token 建 HTTP 客户端
    pub fn with_backend(
        config: AppConfig,
        db: Arc<DatabaseConnection>,
        shared: Option<Backend>,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Result<Self, ApiError> {
        let metrics = SharedMetrics::new();
        let backend = build_backend(&config, shared.as_ref(), None, &metrics)?;
        Ok(Self {
            config,
            db,
            metrics,
            shared,
            backend,
            session: None,
            poller: None,
            watcher: None,
            metrics_task: None,
            events,
        })
    }

    fn emit(&self, event: AppEvent) {
        let _ = self.events.send(event);
    }

    pub async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<AppCommand>) {
        self.startup().await;
        while let Some(cmd) = cmd_rx.recv().await {
            self.handle(cmd).await;
        }
        self.shutdown().await;
    }

    /// 启动时并发做健康检查和会话读取
    async fn startup(&mut self) {
        info!("后台服务启动, api = {}", self.backend_label());
        self.metrics_task = Some(spawn_metrics_publisher(
            self.metrics.clone(),
            self.events.clone(),
        ));

        let api = self.backend.jobs.clone();
        let (health, stored) = futures::join!(
            api.health(),
            SessionRepository::load_session(self.db.as_ref())
        );
        self.emit(health_event(&self.backend_label(), health));

        match stored {
            Ok(Some(session)) => {
                if let Err(e) = self.begin_session(session) {
                    self.emit(AppEvent::Error(format!("✗ 恢复会话失败: {}", e)));
                }
            }
            Ok(None) => self.enter_anonymous(),
            Err(e) => {
                warn!("读取会话失败: {}", e);
                self.emit(AppEvent::Error(format!("✗ 读取会话失败: {}", e)));
                self.enter_anonymous();
            }
        }
    }

    fn backend_label(&self) -> String {
        if self.shared.is_some() {
            "mock".to_string()
        } else {
            self.config.api_base_url.clone()
        }
    }

    fn enter_anonymous(&mut self) {
        self.session = None;
        self.emit(AppEvent::Session(None));
        self.emit(AppEvent::Log(ANONYMOUS_HINT.to_string()));
    }

    /// 用会话里的 token 重建客户端，然后启动任务轮询
    fn begin_session(&mut self, session: StoredSession) -> Result<(), ApiError> {
        self.backend = build_backend(
            &self.config,
            self.shared.as_ref(),
            session.token.clone(),
            &self.metrics,
        )?;
        self.stop_watcher();
        info!("已登录用户 {}", session.user.id);
        self.emit(AppEvent::Session(Some(session.user.clone())));
        self.emit(AppEvent::Message(format!(
            "✓ 已登录: {}",
            session.user.display_name()
        )));
        // 旧的轮询在 Drop 时关闭
        self.poller = Some(PollerHandle::spawn(
            self.backend.jobs.clone(),
            session.user.id.clone(),
            self.events.clone(),
        ));
        self.session = Some(session);
        Ok(())
    }

    fn stop_watcher(&mut self) -> bool {
        match self.watcher.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    fn require_poller(&self) -> Option<&PollerHandle> {
        if self.poller.is_none() {
            self.emit(AppEvent::Log(ANONYMOUS_HINT.to_string()));
        }
        self.poller.as_ref()
    }

    fn require_user(&self) -> Option<String> {
        let user = self.session.as_ref().map(|s| s.user.id.clone());
        if user.is_none() {
            self.emit(AppEvent::Log(ANONYMOUS_HINT.to_string()));
        }
        user
    }

    async fn handle(&mut self, cmd: AppCommand) {
        match cmd {
            AppCommand::Refresh => {
                if let Some(poller) = self.require_poller() {
                    poller.refresh(true);
                }
            }
            AppCommand::Cancel { job_id } => {
                if let Some(poller) = self.require_poller() {
                    poller.cancel(job_id);
                }
            }
            AppCommand::DismissToast => {
                if let Some(poller) = self.poller.as_ref() {
                    poller.dismiss_toast();
                }
            }
            AppCommand::Watch { job_id } => {
                if self.stop_watcher() {
                    debug!("替换已有的任务跟踪");
                }
                let link = self.poller.as_ref().map(|p| p.link());
                self.watcher = Some(spawn_watcher(
                    self.backend.jobs.clone(),
                    job_id.clone(),
                    self.events.clone(),
                    link,
                ));
                self.emit(AppEvent::Message(format!("开始跟踪任务 {}", job_id)));
            }
            AppCommand::WatchStop => {
                if self.stop_watcher() {
                    self.emit(AppEvent::Message("已停止任务跟踪".to_string()));
                } else {
                    self.emit(AppEvent::Log("当前没有正在跟踪的任务".to_string()));
                }
            }
            AppCommand::Submit(args) => self.submit(args),
            AppCommand::ShowResult { backtest_id } => {
                let api = self.backend.jobs.clone();
                let tx = self.events.clone();
                tokio::spawn(async move {
                    match api.get_backtest(&backtest_id).await {
                        Ok(result) => {
                            let _ = tx.send(AppEvent::Result(result));
                        }
                        Err(e) if e.status_code() == Some(404) => {
                            let _ = tx.send(AppEvent::Error(format!(
                                "✗ 回测结果不存在: {}",
                                backtest_id
                            )));
                        }
                        Err(e) => {
                            let _ = tx.send(AppEvent::Error(format!(
                                "✗ 加载回测结果 {} 失败: {}",
                                backtest_id, e
                            )));
                        }
                    }
                });
            }
            AppCommand::Feed(query) => self.load_feed(query),
            AppCommand::Signals => {
                if let Some(user_id) = self.require_user() {
                    let api = self.backend.signals.clone();
                    tokio::spawn(load_signals(api, user_id, self.events.clone()));
                }
            }
            AppCommand::Backtests => {
                if let Some(user_id) = self.require_user() {
                    let api = self.backend.signals.clone();
                    let tx = self.events.clone();
                    tokio::spawn(async move {
                        let event = match api.user_backtests(&user_id).await {
                            Ok(results) => AppEvent::Backtests(results),
                            Err(e) => AppEvent::Error(format!("✗ 加载我的回测失败: {}", e)),
                        };
                        let _ = tx.send(event);
                    });
                }
            }
            AppCommand::CreateSignal(args) => self.create_signal(args),
            AppCommand::DeleteSignal { signal_id } => {
                self.change_signal(signal_id, None);
            }
            AppCommand::SetSignalStatus { signal_id, status } => {
                self.change_signal(signal_id, Some(status));
            }
            AppCommand::Login {
                user_id,
                token,
                name,
            } => self.login(user_id, token, name).await,
            AppCommand::Logout => self.logout().await,
            AppCommand::Metrics => self.emit(AppEvent::Metrics(self.metrics.snapshot())),
            AppCommand::Health => {
                let api = self.backend.jobs.clone();
                let tx = self.events.clone();
                let label = self.backend_label();
                tokio::spawn(async move {
                    let _ = tx.send(health_event(&label, api.health().await));
                });
            }
            AppCommand::Help => self.emit(AppEvent::Message(HELP_TEXT.to_string())),
            AppCommand::Unknown(msg) => self.emit(AppEvent::Error(format!("✗ {}", msg))),
            cmd if cmd.is_view_local() => debug!("忽略本地视图命令 {:?}", cmd),
            cmd => debug!("未处理的命令 {:?}", cmd),
        }
    }

    fn submit(&self, args: SubmitArgs) {
        let Some(session) = self.session.as_ref() else {
            self.emit(AppEvent::Error("✗ 无法提交：未登录".to_string()));
            return;
        };

        let mut req = CreateJobRequest::new(
            session.user.id.clone(),
            Some(args.name),
            args.timeframe,
            args.assets,
        );
        if let Some(period) = args.period {
            req.period = period;
        }
        if let Some(capital) = args.capital {
            req.initial_capital = capital;
        }

        let api = self.backend.jobs.clone();
        let tx = self.events.clone();
        let link = self.poller.as_ref().map(|p| p.link());
        tokio::spawn(async move {
            match api.create_job(&req).await {
                Ok(resp) => {
                    info!("已提交回测任务 {} ({})", resp.job_id, req.strategy_name);
                    let _ = tx.send(AppEvent::Message(format!(
                        "✓ 已提交任务 {}: {}",
                        resp.job_id,
                        resp.message.as_deref().unwrap_or(&req.strategy_name)
                    )));
                    if let Some(link) = link {
                        link.refresh(false);
                    }
                }
                Err(e) => {
                    let _ = tx.send(AppEvent::Error(format!("✗ 提交任务失败: {}", e)));
                }
            }
        });
    }

    /// 社区动态不需要登录
    fn load_feed(&self, query: FeedQuery) {
        let api = self.backend.signals.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            match api.feed(&query).await {
                Ok(page) => {
                    debug!("社区动态 {}: {} 条", query.describe(), page.items.len());
                    let _ = tx.send(AppEvent::Feed { query, page });
                }
                Err(e) => {
                    warn!("加载社区动态失败: {}", e);
                    let _ = tx.send(AppEvent::Error(format!("✗ 加载社区动态失败: {}", e)));
                }
            }
        });
    }

    fn create_signal(&self, args: SignalArgs) {
        let Some(user_id) = self.require_user() else {
            return;
        };
        let draft = SignalDraft {
            user_id: user_id.clone(),
            name: args.name,
            description: args
                .description
                .unwrap_or_else(|| "No description".to_string()),
            timeframe: args.timeframe,
            assets: args.assets,
            status: SignalStatus::Active,
        };
        let api = self.backend.signals.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            match api.create_signal(&draft).await {
                Ok(signal) => {
                    info!("已创建信号 {:?} ({})", signal.id, draft.name);
                    let _ = tx.send(AppEvent::Message(format!(
                        "✓ 已创建信号 {}",
                        signal.display_name()
                    )));
                    load_signals(api, user_id, tx).await;
                }
                Err(e) => {
                    let _ = tx.send(AppEvent::Error(format!("✗ 创建信号失败: {}", e)));
                }
            }
        });
    }

    /// status 为 None 表示删除
    fn change_signal(&self, signal_id: String, status: Option<SignalStatus>) {
        let Some(user_id) = self.require_user() else {
            return;
        };
        let api = self.backend.signals.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let (result, done) = match status {
                Some(status) => (
                    api.update_signal(&signal_id, &SignalUpdate { status }).await,
                    format!("✓ 信号 {} 已设为 {}", signal_id, status),
                ),
                None => (
                    api.delete_signal(&signal_id).await,
                    format!("✓ 已删除信号 {}", signal_id),
                ),
            };
            match result {
                Ok(()) => {
                    let _ = tx.send(AppEvent::Message(done));
                    load_signals(api, user_id, tx).await;
                }
                Err(e) => {
                    warn!("修改信号 {} 失败: {}", signal_id, e);
                    let _ = tx.send(AppEvent::Error(format!(
                        "✗ 操作信号 {} 失败: {}",
                        signal_id, e
                    )));
                }
            }
        });
    }

    async fn login(&mut self, user_id: String, token: String, name: Option<String>) {
        let user = SessionUser {
            id: user_id,
            name,
            email: None,
        };
        if let Err(e) = SessionRepository::save_login(self.db.as_ref(), &user, &token).await {
            self.emit(AppEvent::Error(format!("✗ 保存会话失败: {}", e)));
            return;
        }
        let session = StoredSession {
            user,
            token: Some(token),
        };
        if let Err(e) = self.begin_session(session) {
            self.emit(AppEvent::Error(format!("✗ 登录失败: {}", e)));
        }
    }

    async fn logout(&mut self) {
        self.stop_watcher();
        if let Some(poller) = self.poller.take() {
            poller.shutdown().await;
        }
        if let Err(e) = SessionRepository::clear(self.db.as_ref()).await {
            self.emit(AppEvent::Error(format!("✗ 清除会话失败: {}", e)));
        }
        self.metrics.reset();
        match build_backend(&self.config, self.shared.as_ref(), None, &self.metrics) {
            Ok(backend) => self.backend = backend,
            Err(e) => warn!("重建匿名客户端失败: {}", e),
        }
        info!("已退出登录");
        self.emit(AppEvent::Message("✓ 已退出登录".to_string()));
        self.enter_anonymous();
    }

    async fn shutdown(&mut self) {
        self.stop_watcher();
        if let Some(task) = self.metrics_task.take() {
            task.abort();
        }
        if let Some(poller) = self.poller.take() {
            poller.shutdown().await;
        }
        info!("后台服务已退出");
    }
}

/// 有共享后端时直接复用，否则按 token 新建 HTTP 客户端
fn build_backend(
    config: &AppConfig,
    shared: Option<&Backend>,
    token: Option<String>,
    metrics: &SharedMetrics,
) -> Result<Backend, ApiError> {
    if let Some(shared) = shared {
        return Ok(shared.clone());
    }
    let sink: Arc<dyn MetricsSink> = Arc::new(metrics.clone());
    let client = ApiClient::new(config.api_base_url.clone(), token, Some(sink))?
        .with_jobs_limit(config.jobs_limit);
    Ok(Backend::new(Arc::new(client)))
}

fn health_event(label: &str, health: Result<String, ApiError>) -> AppEvent {
    match health {
        Ok(msg) => AppEvent::Log(format!("✓ 后端可用 ({}): {}", label, msg)),
        Err(e) => AppEvent::Log(format!("⚠ 后端不可用 ({}): {}", label, e)),
    }
}

async fn load_signals(
    api: Arc<dyn SignalsApi>,
    user_id: String,
    tx: mpsc::UnboundedSender<AppEvent>,
) {
    let event = match api.user_signals(&user_id).await {
        Ok(signals) => AppEvent::Signals(signals),
        Err(e) => AppEvent::Error(format!("✗ 加载我的信号失败: {}", e)),
    };
    let _ = tx.send(event);
}

/// 指标有变化时推送快照
fn spawn_metrics_publisher(
    metrics: SharedMetrics,
    events: mpsc::UnboundedSender<AppEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(METRICS_PUBLISH_INTERVAL);
        let mut last = None;
        loop {
            ticker.tick().await;
            let snap = metrics.snapshot();
            if last.as_ref() != Some(&snap) {
                if events.send(AppEvent::Metrics(snap.clone())).is_err() {
                    break;
                }
                last = Some(snap);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::JobsApi;
    use crate::jobs::model::{BacktestResult, CreateJobResponse, JobListResponse, JobRecord};
    use crate::storage::establish_connection;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, timeout};

    async fn service() -> (
        AppService,
        Arc<DatabaseConnection>,
        mpsc::UnboundedReceiver<AppEvent>,
    ) {
        let db = Arc::new(establish_connection("sqlite::memory:").await.unwrap());
        let config = AppConfig::from_lookup(|k| match k {
            "USE_MOCK_API" => Some("true".to_string()),
            _ => None,
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let svc = AppService::new(config, db.clone(), tx).unwrap();
        (svc, db, rx)
    }

    async fn next_matching(
        rx: &mut mpsc::UnboundedReceiver<AppEvent>,
        pred: impl Fn(&AppEvent) -> bool,
    ) -> AppEvent {
        timeout(Duration::from_secs(10), async {
            loop {
                let evt = rx.recv().await.expect("event channel closed");
                if pred(&evt) {
                    return evt;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    #[tokio::test]
    async fn login_starts_polling_and_logout_clears_session() {
        let (svc, db, mut rx) = service().await;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(svc.run(cmd_rx));

        next_matching(&mut rx, |e| matches!(e, AppEvent::Session(None))).await;

        cmd_tx
            .send(AppCommand::Login {
                user_id: "u1".into(),
                token: "tok".into(),
                name: Some("Ada".into()),
            })
            .unwrap();
        next_matching(&mut rx, |e| {
            matches!(e, AppEvent::Session(Some(u)) if u.id == "u1")
        })
        .await;
        let loaded = next_matching(&mut rx, |e| {
            matches!(e, AppEvent::Jobs(v) if v.has_loaded && !v.jobs.is_empty())
        })
        .await;
        assert!(matches!(loaded, AppEvent::Jobs(v) if v.error.is_none()));

        let stored = SessionRepository::load_session(db.as_ref()).await.unwrap();
        assert_eq!(stored.unwrap().token.as_deref(), Some("tok"));

        cmd_tx.send(AppCommand::Logout).unwrap();
        next_matching(&mut rx, |e| matches!(e, AppEvent::Session(None))).await;
        assert!(SessionRepository::load_session(db.as_ref())
            .await
            .unwrap()
            .is_none());

        drop(cmd_tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn restores_saved_session_on_startup() {
        let (svc, db, mut rx) = service().await;
        let user = SessionUser {
            id: "u7".into(),
            name: None,
            email: Some("u7@example.com".into()),
        };
        SessionRepository::save_login(db.as_ref(), &user, "tok-7")
            .await
            .unwrap();

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(svc.run(cmd_rx));
        next_matching(&mut rx, |e| {
            matches!(e, AppEvent::Session(Some(u)) if u.id == "u7")
        })
        .await;
        drop(cmd_tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn anonymous_commands_report_errors() {
        let (svc, _db, mut rx) = service().await;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(svc.run(cmd_rx));

        cmd_tx
            .send(AppCommand::Submit(SubmitArgs {
                name: "X".into(),
                timeframe: "1h".into(),
                assets: vec!["BTC".into()],
                period: None,
                capital: None,
            }))
            .unwrap();
        next_matching(&mut rx, |e| matches!(e, AppEvent::Error(m) if m.contains("未登录"))).await;

        cmd_tx.send(AppCommand::Help).unwrap();
        next_matching(&mut rx, |e| matches!(e, AppEvent::Message(m) if m == HELP_TEXT)).await;

        cmd_tx
            .send(AppCommand::Unknown("未知命令: foo".into()))
            .unwrap();
        next_matching(&mut rx, |e| matches!(e, AppEvent::Error(m) if m.contains("foo"))).await;

        drop(cmd_tx);
        task.await.unwrap();
    }

    /// 提交很慢的后端；启动时的首次健康检查立即返回，之后的检查同样很慢
    struct SlowJobs {
        inner: Arc<MockBackend>,
        health_calls: AtomicUsize,
    }

    #[async_trait]
    impl JobsApi for SlowJobs {
        async fn list_user_jobs(&self, user_id: &str) -> Result<JobListResponse, ApiError> {
            self.inner.list_user_jobs(user_id).await
        }

        async fn get_job(&self, job_id: &str) -> Result<JobRecord, ApiError> {
            self.inner.get_job(job_id).await
        }

        async fn cancel_job(&self, job_id: &str) -> Result<(), ApiError> {
            self.inner.cancel_job(job_id).await
        }

        async fn create_job(&self, req: &CreateJobRequest) -> Result<CreateJobResponse, ApiError> {
            sleep(Duration::from_secs(30)).await;
            self.inner.create_job(req).await
        }

        async fn get_backtest(&self, id: &str) -> Result<BacktestResult, ApiError> {
            self.inner.get_backtest(id).await
        }

        async fn health(&self) -> Result<String, ApiError> {
            if self.health_calls.fetch_add(1, Ordering::SeqCst) > 0 {
                sleep(Duration::from_secs(30)).await;
            }
            self.inner.health().await
        }
    }

    #[tokio::test]
    async fn slow_backend_calls_do_not_block_commands() {
        let db = Arc::new(establish_connection("sqlite::memory:").await.unwrap());
        let user = SessionUser {
            id: "u1".into(),
            name: None,
            email: None,
        };
        SessionRepository::save_login(db.as_ref(), &user, "tok")
            .await
            .unwrap();

        let mock = Arc::new(MockBackend::with_seed(4));
        let backend = Backend {
            jobs: Arc::new(SlowJobs {
                inner: mock.clone(),
                health_calls: AtomicUsize::new(0),
            }),
            signals: mock,
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let svc =
            AppService::with_backend(AppConfig::from_lookup(|_| None), db, Some(backend), tx)
                .unwrap();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(svc.run(cmd_rx));
        next_matching(&mut rx, |e| matches!(e, AppEvent::Session(Some(_)))).await;

        cmd_tx
            .send(AppCommand::Submit(SubmitArgs {
                name: "Slow".into(),
                timeframe: "1h".into(),
                assets: vec!["BTC".into()],
                period: None,
                capital: None,
            }))
            .unwrap();
        cmd_tx.send(AppCommand::Health).unwrap();
        cmd_tx.send(AppCommand::Signals).unwrap();
        cmd_tx.send(AppCommand::Help).unwrap();

        timeout(Duration::from_secs(2), async {
            let mut help = false;
            let mut signals = false;
            while !(help && signals) {
                match rx.recv().await.expect("event channel closed") {
                    AppEvent::Message(m) if m == HELP_TEXT => help = true,
                    AppEvent::Signals(list) => signals = !list.is_empty(),
                    AppEvent::Message(m) if m.starts_with("✓ 已提交任务") => {
                        panic!("submit finished before the slow backend returned")
                    }
                    _ => {}
                }
            }
        })
        .await
        .expect("commands were blocked behind slow backend calls");

        drop(cmd_tx);
        task.abort();
    }

    #[tokio::test]
    async fn feed_is_public_and_signal_changes_reload_the_list() {
        let (svc, _db, mut rx) = service().await;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(svc.run(cmd_rx));
        next_matching(&mut rx, |e| matches!(e, AppEvent::Session(None))).await;

        let query = FeedQuery::default().next_page();
        cmd_tx.send(AppCommand::Feed(query.clone())).unwrap();
        let feed = next_matching(&mut rx, |e| matches!(e, AppEvent::Feed { .. })).await;
        assert!(matches!(feed, AppEvent::Feed { query: q, page } if q == query
            && page.current_page == Some(2)
            && page.items.len() == 10));

        cmd_tx.send(AppCommand::Signals).unwrap();
        next_matching(&mut rx, |e| matches!(e, AppEvent::Log(m) if m == ANONYMOUS_HINT)).await;

        cmd_tx
            .send(AppCommand::Login {
                user_id: "u1".into(),
                token: "tok".into(),
                name: None,
            })
            .unwrap();
        cmd_tx
            .send(AppCommand::CreateSignal(SignalArgs {
                name: "DOT Swing".into(),
                timeframe: "4h".into(),
                assets: vec!["DOT/USD".into()],
                description: None,
            }))
            .unwrap();
        let listed = next_matching(&mut rx, |e| matches!(e, AppEvent::Signals(_))).await;
        let AppEvent::Signals(signals) = listed else {
            unreachable!()
        };
        assert_eq!(signals.len(), 4);
        let created = signals
            .iter()
            .find(|s| s.name.as_deref() == Some("DOT Swing"))
            .unwrap();
        assert_eq!(created.description.as_deref(), Some("No description"));
        let id = created.id.clone().unwrap();

        cmd_tx
            .send(AppCommand::SetSignalStatus {
                signal_id: id.clone(),
                status: SignalStatus::Paused,
            })
            .unwrap();
        let listed = next_matching(&mut rx, |e| matches!(e, AppEvent::Signals(_))).await;
        assert!(matches!(listed, AppEvent::Signals(list)
            if list.iter().any(|s| s.id.as_deref() == Some(id.as_str())
                && s.status == Some(SignalStatus::Paused))));

        cmd_tx
            .send(AppCommand::DeleteSignal {
                signal_id: "missing".into(),
            })
            .unwrap();
        next_matching(&mut rx, |e| matches!(e, AppEvent::Error(m) if m.contains("missing"))).await;

        cmd_tx.send(AppCommand::Backtests).unwrap();
        let results = next_matching(&mut rx, |e| matches!(e, AppEvent::Backtests(_))).await;
        assert!(matches!(results, AppEvent::Backtests(list) if !list.is_empty()));

        drop(cmd_tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn submit_and_open_result_against_mock() {
        let (svc, _db, mut rx) = service().await;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(svc.run(cmd_rx));

        cmd_tx
            .send(AppCommand::Login {
                user_id: "u1".into(),
                token: "tok".into(),
                name: None,
            })
            .unwrap();
        // 种子数据里已完成任务带有结果 ID
        let view = next_matching(&mut rx, |e| {
            matches!(e, AppEvent::Jobs(v) if v.jobs.iter().any(|j| j.result_id().is_some()))
        })
        .await;
        let AppEvent::Jobs(view) = view else {
            unreachable!()
        };
        let backtest_id = view
            .jobs
            .iter()
            .find_map(|j| j.result_id().map(str::to_string))
            .unwrap();

        cmd_tx
            .send(AppCommand::Submit(SubmitArgs {
                name: "RSI Reversal".into(),
                timeframe: "4h".into(),
                assets: vec!["ETH".into()],
                period: Some("1 year".into()),
                capital: Some(5000.0),
            }))
            .unwrap();
        next_matching(&mut rx, |e| {
            matches!(e, AppEvent::Message(m) if m.starts_with("✓ 已提交任务"))
        })
        .await;

        cmd_tx
            .send(AppCommand::ShowResult {
                backtest_id: backtest_id.clone(),
            })
            .unwrap();
        let result = next_matching(&mut rx, |e| matches!(e, AppEvent::Result(_))).await;
        assert!(matches!(result, AppEvent::Result(r) if r.id == backtest_id && !r.chart_data.datasets.is_empty()));

        drop(cmd_tx);
        task.await.unwrap();
    }
}
