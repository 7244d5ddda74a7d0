use crate::api::ApiMetrics;
use crate::commands::AppCommand;
use crate::jobs::model::{BacktestResult, JobRecord, JobStats};
use crate::jobs::poller::JobsView;
use crate::jobs::projection::Projection;
use crate::signals::{FeedItem, FeedKind, FeedPage, FeedQuery, Signal};
use crate::storage::repository::SessionUser;
use crossterm::event::KeyCode;
use ratatui::widgets::ListState;
use std::str::FromStr;
use tokio::sync::mpsc;

const MAX_LOG_LINES: usize = 1000;

pub const MENU_ITEMS: [&str; 8] = [
    "回测任务",
    "任务统计",
    "任务详情",
    "回测结果",
    "社区动态",
    "我的信号",
    "我的回测",
    "API 指标",
];

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum ViewMode {
    JobList,
    Summary,
    Detail,
    Result,
    Feed,
    Signals,
    Backtests,
    Metrics,
}

impl ViewMode {
    fn from_menu(index: usize) -> Option<Self> {
        match index {
            0 => Some(ViewMode::JobList),
            1 => Some(ViewMode::Summary),
            2 => Some(ViewMode::Detail),
            3 => Some(ViewMode::Result),
            4 => Some(ViewMode::Feed),
            5 => Some(ViewMode::Signals),
            6 => Some(ViewMode::Backtests),
            7 => Some(ViewMode::Metrics),
            _ => None,
        }
    }

    pub(crate) fn menu_index(&self) -> usize {
        match self {
            ViewMode::JobList => 0,
            ViewMode::Summary => 1,
            ViewMode::Detail => 2,
            ViewMode::Result => 3,
            ViewMode::Feed => 4,
            ViewMode::Signals => 5,
            ViewMode::Backtests => 6,
            ViewMode::Metrics => 7,
        }
    }
}

/// 按需加载的列表视图：数据、是否加载过、选中行
pub struct Pane<T> {
    pub items: Vec<T>,
    pub loaded: bool,
    pub state: ListState,
}

impl<T> Default for Pane<T> {
    fn default() -> Self {
        let mut state = ListState::default();
        state.select(Some(0));
        Self {
            items: Vec::new(),
            loaded: false,
            state,
        }
    }
}

impl<T> Pane<T> {
    /// 换一批数据，选中行保持在范围内
    pub fn set(&mut self, items: Vec<T>) {
        self.items = items;
        self.loaded = true;
        let max = self.items.len().saturating_sub(1);
        self.state.select(Some(self.index().min(max)));
    }

    pub fn index(&self) -> usize {
        self.state.selected().unwrap_or(0)
    }

    pub fn selected(&self) -> Option<&T> {
        self.items.get(self.index())
    }

    fn up(&mut self) {
        self.state.select(Some(self.index().saturating_sub(1)));
    }

    fn down(&mut self) {
        if self.index() + 1 < self.items.len() {
            self.state.select(Some(self.index() + 1));
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum InputMode {
    Normal,
    Command,
}

#[derive(PartialEq, Debug, Clone)]
pub enum FocusArea {
    Menu,     // 焦点在左侧菜单
    MainView, // 焦点在主视图
}

#[derive(Debug)]
pub enum AppEvent {
    Log(String),
    Message(String),
    Error(String),
    Jobs(JobsView),
    Watched(JobRecord),
    Result(BacktestResult),
    Metrics(ApiMetrics),
    Feed {
        query: FeedQuery,
        page: FeedPage,
    },
    Signals(Vec<Signal>),
    Backtests(Vec<BacktestResult>),
    /// 登录状态变化；None 表示匿名
    Session(Option<SessionUser>),
}

/// 当前动态页的分页信息
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedInfo {
    pub total_items: Option<usize>,
    pub total_pages: Option<usize>,
    pub has_next: bool,
}

pub struct App {
    pub view_mode: ViewMode,
    pub input_mode: InputMode,
    pub focus_area: FocusArea,
    pub menu_selected_index: usize,
    pub jobs: JobsView,
    pub job_list: Vec<JobRecord>,
    pub projection: Projection,
    pub selected_index: usize,
    pub job_list_state: ListState,
    pub detail_id: Option<String>,
    pub watched: Option<JobRecord>,
    pub result: Option<BacktestResult>,
    pub metrics: ApiMetrics,
    pub feed: Pane<FeedItem>,
    pub feed_query: FeedQuery,
    pub feed_info: FeedInfo,
    pub signals: Pane<Signal>,
    pub backtests: Pane<BacktestResult>,
    pub user: Option<SessionUser>,
    pub detail_scroll: u16,
    pub command_input: String,
    pub command_cursor: usize,
    pub command_history: Vec<String>,
    pub command_history_index: Option<usize>,
    pub log_messages: Vec<String>,
    pub cmd_tx: mpsc::UnboundedSender<AppCommand>,
    pub evt_rx: Option<mpsc::UnboundedReceiver<AppEvent>>,
}

impl App {
    pub fn new(
        session_info: Vec<String>,
        cmd_tx: mpsc::UnboundedSender<AppCommand>,
        evt_rx: mpsc::UnboundedReceiver<AppEvent>,
    ) -> App {
        let mut log_messages = vec!["应用已启动".to_string()];
        log_messages.extend(session_info);

        App {
            view_mode: ViewMode::JobList,
            input_mode: InputMode::Normal,
            focus_area: FocusArea::MainView,
            menu_selected_index: 0,
            jobs: JobsView::default(),
            job_list: Vec::new(),
            projection: Projection::default(),
            selected_index: 0,
            job_list_state: {
                let mut s = ListState::default();
                s.select(Some(0));
                s
            },
            detail_id: None,
            watched: None,
            result: None,
            metrics: ApiMetrics::default(),
            feed: Pane::default(),
            feed_query: FeedQuery::default(),
            feed_info: FeedInfo::default(),
            signals: Pane::default(),
            backtests: Pane::default(),
            user: None,
            detail_scroll: 0,
            command_input: String::new(),
            command_cursor: 0,
            command_history: Vec::new(),
            command_history_index: None,
            log_messages,
            cmd_tx,
            evt_rx: Some(evt_rx),
        }
    }

    pub fn add_log(&mut self, msg: String) {
        self.log_messages.push(msg);
        if self.log_messages.len() > MAX_LOG_LINES {
            let overflow = self.log_messages.len() - MAX_LOG_LINES;
            self.log_messages.drain(..overflow);
        }
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Log(msg) | AppEvent::Message(msg) | AppEvent::Error(msg) => self.add_log(msg),
            AppEvent::Jobs(view) => {
                self.jobs = view;
                self.apply_projection();
            }
            AppEvent::Watched(job) => {
                if self.detail_id.is_none() {
                    self.detail_id = Some(job.job_id.clone());
                }
                self.watched = Some(job);
            }
            AppEvent::Result(result) => {
                self.result = Some(result);
                self.switch_view(ViewMode::Result);
            }
            AppEvent::Metrics(metrics) => self.metrics = metrics,
            AppEvent::Feed { query, page } => {
                if query != self.feed_query {
                    self.feed.state.select(Some(0));
                }
                self.feed_info = FeedInfo {
                    total_items: page.total_items,
                    total_pages: page.total_pages,
                    has_next: page.has_next(),
                };
                self.feed_query = query;
                self.feed.set(page.items);
            }
            AppEvent::Signals(signals) => self.signals.set(signals),
            AppEvent::Backtests(results) => self.backtests.set(results),
            AppEvent::Session(user) => {
                if user.is_none() {
                    self.jobs = JobsView::default();
                    self.watched = None;
                    self.detail_id = None;
                    self.result = None;
                    self.signals.reset();
                    self.backtests.reset();
                    self.apply_projection();
                }
                self.user = user;
            }
        }
    }

    pub fn stats(&self) -> JobStats {
        JobStats::from_jobs(&self.jobs.jobs)
    }

    pub fn selected_job(&self) -> Option<&JobRecord> {
        self.job_list.get(self.selected_index)
    }

    /// 详情页展示的任务：优先用 watcher 的最新快照
    pub fn detail_job(&self) -> Option<&JobRecord> {
        let id = self.detail_id.as_deref()?;
        match &self.watched {
            Some(w) if w.job_id == id => Some(w),
            _ => self.jobs.jobs.iter().find(|j| j.job_id == id),
        }
    }

    pub fn is_pending_confirmation(&self, job_id: &str) -> bool {
        self.jobs.pending_confirmation.iter().any(|id| id == job_id)
    }

    /// 重新过滤排序，尽量保持选中同一个任务
    pub fn apply_projection(&mut self) {
        let selected_id = self.selected_job().map(|j| j.job_id.clone());
        self.job_list = self.projection.apply(&self.jobs.jobs);
        self.selected_index = selected_id
            .and_then(|id| self.job_list.iter().position(|j| j.job_id == id))
            .unwrap_or(0);
        self.clamp_selection();
    }

    pub fn clamp_selection(&mut self) {
        if self.selected_index >= self.job_list.len() {
            self.selected_index = self.job_list.len().saturating_sub(1);
        }
        self.job_list_state.select(Some(self.selected_index));
    }

    fn switch_view(&mut self, view: ViewMode) {
        self.view_mode = view;
        self.menu_selected_index = view.menu_index();
        self.detail_scroll = 0;
    }

    fn send(&self, cmd: AppCommand) {
        let _ = self.cmd_tx.send(cmd);
    }

    /// 打开选中任务：已完成且有结果的直接请求回测结果，否则进入详情页
    fn open_selected(&mut self) {
        let Some(job) = self.selected_job() else {
            return;
        };
        let job_id = job.job_id.clone();
        let result_id = job.result_id().map(|s| s.to_string());
        self.detail_id = Some(job_id);
        match result_id {
            Some(backtest_id) => {
                self.add_log(format!("正在加载回测结果 {}", backtest_id));
                self.send(AppCommand::ShowResult { backtest_id });
            }
            None => self.switch_view(ViewMode::Detail),
        }
    }

    fn open_result(&mut self, result: BacktestResult) {
        self.add_log(format!("打开回测结果 {}", result.id));
        self.result = Some(result);
        self.switch_view(ViewMode::Result);
    }

    /// 列表视图的加载命令；其他视图返回 None
    fn reload_command(&self, view: ViewMode) -> Option<AppCommand> {
        match view {
            ViewMode::Feed => Some(AppCommand::Feed(self.feed_query.clone())),
            ViewMode::Signals => Some(AppCommand::Signals),
            ViewMode::Backtests => Some(AppCommand::Backtests),
            ViewMode::Metrics => Some(AppCommand::Metrics),
            _ => None,
        }
    }

    fn move_selection(&mut self, down: bool) {
        match self.view_mode {
            ViewMode::Detail | ViewMode::Result => {
                self.detail_scroll = if down {
                    self.detail_scroll.saturating_add(1)
                } else {
                    self.detail_scroll.saturating_sub(1)
                };
            }
            ViewMode::Feed if down => self.feed.down(),
            ViewMode::Feed => self.feed.up(),
            ViewMode::Signals if down => self.signals.down(),
            ViewMode::Signals => self.signals.up(),
            ViewMode::Backtests if down => self.backtests.down(),
            ViewMode::Backtests => self.backtests.up(),
            _ if down => {
                if self.selected_index < self.job_list.len().saturating_sub(1) {
                    self.selected_index += 1;
                    self.job_list_state.select(Some(self.selected_index));
                }
            }
            _ => {
                if self.selected_index > 0 {
                    self.selected_index -= 1;
                    self.job_list_state.select(Some(self.selected_index));
                }
            }
        }
    }

    /// 动态 / 信号 / 回测视图的专属按键
    fn handle_pane_key(&mut self, key: KeyCode) {
        match (self.view_mode, key) {
            (ViewMode::Feed, KeyCode::Char('n')) => {
                if self.feed_info.has_next {
                    self.send(AppCommand::Feed(self.feed_query.next_page()));
                } else {
                    self.add_log("⚠ 已是最后一页".to_string());
                }
            }
            (ViewMode::Feed, KeyCode::Char('p')) => {
                if self.feed_query.page > 1 {
                    self.send(AppCommand::Feed(self.feed_query.prev_page()));
                } else {
                    self.add_log("⚠ 已是第一页".to_string());
                }
            }
            (ViewMode::Feed, KeyCode::Char('t')) => {
                let kind = match self.feed_query.kind {
                    None => Some(FeedKind::Signal),
                    Some(FeedKind::Signal) => Some(FeedKind::Backtest),
                    Some(FeedKind::Backtest) => None,
                };
                self.send(AppCommand::Feed(FeedQuery {
                    page: 1,
                    kind,
                    ..self.feed_query.clone()
                }));
            }
            (ViewMode::Signals, KeyCode::Char('d')) => {
                if let Some(id) = self.selected_signal_id() {
                    self.send(AppCommand::DeleteSignal { signal_id: id });
                }
            }
            (ViewMode::Signals, KeyCode::Char('p')) => {
                let target = self
                    .signals
                    .selected()
                    .map(|s| s.status_or_default().toggled());
                if let (Some(id), Some(status)) = (self.selected_signal_id(), target) {
                    self.send(AppCommand::SetSignalStatus {
                        signal_id: id,
                        status,
                    });
                }
            }
            _ => {}
        }
    }

    fn selected_signal_id(&mut self) -> Option<String> {
        let selected = self.signals.selected()?;
        match &selected.id {
            Some(id) => Some(id.clone()),
            None => {
                self.add_log("✗ 该信号没有 ID，无法操作".to_string());
                None
            }
        }
    }

    /// 本地命令在这里处理，其余交给后台 actor；返回 true 表示退出
    fn dispatch(&mut self, cmd: AppCommand) -> bool {
        match cmd {
            AppCommand::Filter(filter) => {
                self.projection.filter = filter;
                self.apply_projection();
                self.add_log(format!("过滤: {}", filter.label()));
            }
            AppCommand::Sort { key, order } => {
                self.projection.sort_order = match order {
                    Some(o) => o,
                    None if self.projection.sort_key == key => self.projection.sort_order.toggle(),
                    None => self.projection.sort_order,
                };
                self.projection.sort_key = key;
                self.apply_projection();
                self.add_log(format!(
                    "排序: {} {}",
                    key.as_str(),
                    self.projection.sort_order.as_str()
                ));
            }
            AppCommand::Stats => self.switch_view(ViewMode::Summary),
            AppCommand::Quit => return true,
            AppCommand::Watch { job_id } => {
                self.detail_id = Some(job_id.clone());
                self.switch_view(ViewMode::Detail);
                self.send(AppCommand::Watch { job_id });
            }
            AppCommand::Metrics => {
                self.switch_view(ViewMode::Metrics);
                self.send(cmd);
            }
            AppCommand::Feed(_) => {
                self.switch_view(ViewMode::Feed);
                self.send(cmd);
            }
            AppCommand::Signals
            | AppCommand::CreateSignal(_)
            | AppCommand::DeleteSignal { .. }
            | AppCommand::SetSignalStatus { .. } => {
                self.switch_view(ViewMode::Signals);
                self.send(cmd);
            }
            AppCommand::Backtests => {
                self.switch_view(ViewMode::Backtests);
                self.send(cmd);
            }
            other => self.send(other),
        }
        false
    }

    /// 获取当前的预测建议
    pub fn get_completion_hint(&self) -> Option<String> {
        let commands = [
            "refresh", "cancel", "watch", "submit", "result", "feed", "signals", "signal",
            "backtests", "filter", "sort", "login", "logout", "stats", "metrics", "health",
            "dismiss", "help", "quit",
        ];
        let input = self.command_input.trim();
        if input.is_empty() {
            return None;
        }

        let parts: Vec<&str> = input.split_whitespace().collect();
        let complete = |cur: &str, candidates: &[&str]| {
            candidates
                .iter()
                .find(|c| c.starts_with(cur) && **c != cur)
                .map(|c| c[cur.len()..].to_string())
        };

        if parts.len() == 1 && !input.ends_with(' ') {
            return complete(parts[0], &commands);
        }
        let cur = if input.ends_with(' ') {
            ""
        } else {
            parts.last().copied().unwrap_or("")
        };
        match (parts[0], parts.len()) {
            ("filter", 1) | ("filter", 2) => complete(
                cur,
                &["all", "pending", "running", "completed", "failed", "cancelled"],
            ),
            ("sort", 1) | ("sort", 2) => complete(
                cur,
                &["created", "started", "completed", "name", "status", "progress"],
            ),
            ("watch", 1) | ("watch", 2) => complete(cur, &["stop"]),
            ("signal", 1) | ("signal", 2) => {
                complete(cur, &["create", "pause", "resume", "delete"])
            }
            ("feed", _) => complete(cur, &["all", "signal", "backtest"]),
            _ => None,
        }
    }

    pub fn handle_key_event(&mut self, key: KeyCode) -> bool {
        if self.input_mode == InputMode::Command {
            return self.handle_command_key(key);
        }

        // 正常模式下的按键处理
        match key {
            KeyCode::Char('/') | KeyCode::Char(':') => {
                self.input_mode = InputMode::Command;
                self.command_input.clear();
                self.command_cursor = 0;
                false
            }
            KeyCode::Char('q') => true,
            KeyCode::Left => {
                self.focus_area = FocusArea::Menu;
                false
            }
            KeyCode::Right => {
                self.focus_area = FocusArea::MainView;
                false
            }
            KeyCode::Up => {
                if self.focus_area == FocusArea::Menu {
                    self.menu_selected_index = self.menu_selected_index.saturating_sub(1);
                } else {
                    self.move_selection(false);
                }
                false
            }
            KeyCode::Down => {
                if self.focus_area == FocusArea::Menu {
                    if self.menu_selected_index < MENU_ITEMS.len() - 1 {
                        self.menu_selected_index += 1;
                    }
                } else {
                    self.move_selection(true);
                }
                false
            }
            KeyCode::Enter => {
                if self.focus_area == FocusArea::Menu {
                    if let Some(view) = ViewMode::from_menu(self.menu_selected_index) {
                        if let Some(cmd) = self.reload_command(view) {
                            self.send(cmd);
                        }
                        self.switch_view(view);
                    }
                    self.focus_area = FocusArea::MainView;
                } else {
                    match self.view_mode {
                        ViewMode::JobList => self.open_selected(),
                        ViewMode::Feed => {
                            if let Some(result) = self.feed.selected().map(FeedItem::to_result) {
                                self.open_result(result);
                            }
                        }
                        ViewMode::Backtests => {
                            if let Some(result) = self.backtests.selected().cloned() {
                                self.open_result(result);
                            }
                        }
                        _ => {}
                    }
                }
                false
            }
            _ if self.focus_area != FocusArea::MainView => false,
            KeyCode::Char('r') => {
                // 阻塞错误页的重试也走这里
                let cmd = self
                    .reload_command(self.view_mode)
                    .unwrap_or(AppCommand::Refresh);
                self.send(cmd);
                false
            }
            KeyCode::Char('x') | KeyCode::Esc => {
                if self.view_mode == ViewMode::JobList {
                    if self.jobs.toast.is_some() {
                        self.send(AppCommand::DismissToast);
                    }
                } else {
                    self.switch_view(ViewMode::JobList);
                }
                false
            }
            _ if self.view_mode != ViewMode::JobList => {
                self.handle_pane_key(key);
                false
            }
            KeyCode::Char('c') => {
                if let Some(job) = self.selected_job() {
                    let job_id = job.job_id.clone();
                    self.send(AppCommand::Cancel { job_id });
                }
                false
            }
            KeyCode::Char('w') => {
                if let Some(job) = self.selected_job() {
                    let job_id = job.job_id.clone();
                    self.dispatch(AppCommand::Watch { job_id });
                }
                false
            }
            KeyCode::Char('f') => {
                self.projection.filter = self.projection.filter.next();
                self.apply_projection();
                false
            }
            KeyCode::Char('s') => {
                self.projection.sort_key = self.projection.sort_key.next();
                self.apply_projection();
                false
            }
            KeyCode::Char('o') => {
                self.projection.sort_order = self.projection.sort_order.toggle();
                self.apply_projection();
                false
            }
            _ => false,
        }
    }

    fn reset_command_line(&mut self) {
        self.command_input.clear();
        self.command_cursor = 0;
        self.input_mode = InputMode::Normal;
    }

    fn handle_command_key(&mut self, key: KeyCode) -> bool {
        match key {
            KeyCode::Enter => {
                let cmd_owned = self.command_input.trim().to_string();
                self.reset_command_line();
                if cmd_owned.is_empty() {
                    return false;
                }
                self.command_history.push(cmd_owned.clone());
                self.command_history_index = None;
                let cmd = AppCommand::from_str(&cmd_owned)
                    .unwrap_or_else(|_| AppCommand::Unknown(cmd_owned.clone()));
                self.dispatch(cmd)
            }
            KeyCode::Esc => {
                self.reset_command_line();
                false
            }
            KeyCode::Tab => {
                if let Some(hint) = self.get_completion_hint() {
                    let insert = format!("{} ", hint);
                    self.insert_at_cursor(&insert);
                }
                false
            }
            KeyCode::Up => {
                if self.command_history.is_empty() {
                    return false;
                }
                let next = match self.command_history_index {
                    None => self.command_history.len() - 1,
                    Some(i) => i.saturating_sub(1),
                };
                self.load_history(next);
                false
            }
            KeyCode::Down => {
                match self.command_history_index {
                    Some(i) if i + 1 < self.command_history.len() => self.load_history(i + 1),
                    Some(_) => {
                        self.command_history_index = None;
                        self.command_input.clear();
                        self.command_cursor = 0;
                    }
                    None => {}
                }
                false
            }
            KeyCode::Backspace => {
                if self.command_cursor > 0 {
                    let idx = self.byte_index(self.command_cursor - 1);
                    self.command_input.remove(idx);
                    self.command_cursor -= 1;
                }
                false
            }
            KeyCode::Delete => {
                if self.command_cursor < self.command_input.chars().count() {
                    let idx = self.byte_index(self.command_cursor);
                    self.command_input.remove(idx);
                }
                false
            }
            KeyCode::Left => {
                self.command_cursor = self.command_cursor.saturating_sub(1);
                false
            }
            KeyCode::Right => {
                if self.command_cursor < self.command_input.chars().count() {
                    self.command_cursor += 1;
                }
                false
            }
            KeyCode::Home => {
                self.command_cursor = 0;
                false
            }
            KeyCode::End => {
                self.command_cursor = self.command_input.chars().count();
                false
            }
            KeyCode::Char(c) => {
                let idx = self.byte_index(self.command_cursor);
                self.command_input.insert(idx, c);
                self.command_cursor += 1;
                false
            }
            _ => false,
        }
    }

    fn load_history(&mut self, index: usize) {
        self.command_history_index = Some(index);
        if let Some(cmd) = self.command_history.get(index) {
            self.command_input = cmd.clone();
            self.command_cursor = self.command_input.chars().count();
        }
    }

    fn insert_at_cursor(&mut self, s: &str) {
        let idx = self.byte_index(self.command_cursor);
        self.command_input.insert_str(idx, s);
        self.command_cursor += s.chars().count();
    }

    /// 光标按字符计，转换成字节下标（支持中文输入）
    fn byte_index(&self, char_pos: usize) -> usize {
        self.command_input
            .char_indices()
            .nth(char_pos)
            .map(|(i, _)| i)
            .unwrap_or(self.command_input.len())
    }
}
