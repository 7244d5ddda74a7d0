use crate::api::metrics::format_ms;
use crate::app_state::{App, FocusArea, InputMode, ViewMode, MENU_ITEMS};
use crate::jobs::model::{format_timestamp, BacktestResult, ChartData, JobRecord, JobStatus};
use crate::jobs::scheduler::PollMode;
use crate::signals::{FeedItem, FeedKind, Signal, SignalStatus};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, Gauge, GraphType, List, ListItem, Paragraph, Wrap},
    Frame,
};

const SERIES_COLORS: [Color; 5] = [
    Color::Cyan,
    Color::Yellow,
    Color::Magenta,
    Color::Green,
    Color::LightRed,
];

pub fn draw(f: &mut Frame, app: &mut App) {
    // 创建布局
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // 顶部标题栏
            Constraint::Min(0),    // 中间内容区域
            Constraint::Min(8),    // 底部命令/日志区域
        ])
        .split(f.size());

    render_top_bar(f, chunks[0], app);

    let middle_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(20), Constraint::Min(0)])
        .split(chunks[1]);

    render_left_menu(f, middle_chunks[0], app);
    render_main_view(f, middle_chunks[1], app);
    render_bottom_bar(f, chunks[2], app);
}

fn na() -> String {
    "N/A".to_string()
}

fn fmt_num(v: Option<f64>, decimals: usize, suffix: &str) -> String {
    match v {
        Some(v) if v.is_finite() => format!("{:.*}{}", decimals, v, suffix),
        _ => na(),
    }
}

fn fmt_money(v: Option<f64>) -> String {
    match v {
        Some(v) if v.is_finite() => format!("${:.2}", v),
        _ => na(),
    }
}

fn fmt_secs(v: Option<f64>) -> String {
    match v {
        Some(s) if s.is_finite() && s >= 0.0 => {
            let s = s.round() as i64;
            if s >= 60 {
                format!("{}m{:02}s", s / 60, s % 60)
            } else {
                format!("{}s", s)
            }
        }
        _ => na(),
    }
}

fn status_style(status: JobStatus) -> (&'static str, Color) {
    match status {
        JobStatus::Pending => ("○", Color::Yellow),
        JobStatus::Running => ("▶", Color::Cyan),
        JobStatus::Completed => ("✓", Color::Green),
        JobStatus::Failed => ("✗", Color::Red),
        JobStatus::Cancelled => ("■", Color::Gray),
    }
}

/// 文本进度条，如 `[████░░░░░░]  40%`
fn progress_bar(pct: f64, width: usize) -> String {
    let pct = if pct.is_finite() { pct.clamp(0.0, 100.0) } else { 0.0 };
    let filled = ((pct / 100.0) * width as f64).round() as usize;
    format!(
        "[{}{}] {:>3.0}%",
        "█".repeat(filled),
        "░".repeat(width - filled),
        pct
    )
}

/// 每条序列转成 (x = 下标, y = 值) 的点集，跳过非有限值
fn chart_series(data: &ChartData) -> Vec<(String, Vec<(f64, f64)>)> {
    data.datasets
        .iter()
        .map(|ds| {
            let points = ds
                .data
                .iter()
                .enumerate()
                .filter(|(_, v)| v.is_finite())
                .map(|(i, v)| (i as f64, *v))
                .collect();
            (ds.label.clone(), points)
        })
        .collect()
}

/// y 轴范围上下各留 5%，常数序列给一个最小跨度
fn padded_bounds(bounds: (f64, f64)) -> [f64; 2] {
    let (lo, hi) = bounds;
    let span = hi - lo;
    let pad = if span > 0.0 {
        span * 0.05
    } else {
        lo.abs().max(1.0) * 0.05
    };
    [lo - pad, hi + pad]
}

fn border_style(app: &App) -> Style {
    if app.focus_area == FocusArea::MainView {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::White)
    }
}

fn main_block(app: &App, title: String) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .title(title)
        .style(border_style(app))
}

fn render_top_bar(f: &mut Frame, area: Rect, app: &App) {
    let user = match &app.user {
        Some(u) => Span::styled(
            format!(" 用户: {} ", u.display_name()),
            Style::default().fg(Color::Green),
        ),
        None => Span::styled(" 匿名 ", Style::default().fg(Color::Yellow)),
    };
    let polling = match (app.jobs.polling, app.jobs.mode) {
        (true, Some(PollMode::Active)) => " 轮询: 5s ",
        (true, _) => " 轮询: 20s ",
        (false, _) => " 轮询: 停止 ",
    };

    let title_text = Line::from(vec![
        Span::styled(
            " rustbt 回测任务 ",
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" - Terminal TUI |"),
        user,
        Span::raw("|"),
        Span::styled(polling, Style::default().fg(Color::Gray)),
    ]);

    let paragraph = Paragraph::new(title_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::Cyan)),
        )
        .alignment(Alignment::Center);
    f.render_widget(paragraph, area);
}

fn render_left_menu(f: &mut Frame, area: Rect, app: &App) {
    let menu_items: Vec<ListItem> = MENU_ITEMS
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let is_selected = i == app.menu_selected_index;
            let is_active = i == app.view_mode.menu_index();

            let style = if is_selected {
                if app.focus_area == FocusArea::Menu {
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::Magenta)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                        .fg(Color::Magenta)
                        .add_modifier(Modifier::BOLD)
                }
            } else if is_active {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::White)
            };

            let prefix = if is_active { "● " } else { "○ " };
            ListItem::new(format!("{}{}", prefix, text)).style(style)
        })
        .collect();

    let title = if app.focus_area == FocusArea::Menu {
        "菜单 (Enter 确认)"
    } else {
        "菜单 (← 切换)"
    };

    let menu =
        List::new(menu_items).block(Block::default().borders(Borders::ALL).title(title).style(
            if app.focus_area == FocusArea::Menu {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default().fg(Color::White)
            },
        ));
    f.render_widget(menu, area);
}

fn render_main_view(f: &mut Frame, area: Rect, app: &mut App) {
    match app.view_mode {
        ViewMode::JobList => render_job_list(f, area, app),
        ViewMode::Summary => render_summary(f, area, app),
        ViewMode::Detail => render_detail(f, area, app),
        ViewMode::Result => render_result(f, area, app),
        ViewMode::Feed => render_feed(f, area, app),
        ViewMode::Signals => render_signals(f, area, app),
        ViewMode::Backtests => render_backtests(f, area, app),
        ViewMode::Metrics => render_metrics(f, area, app),
    }
}

fn render_notice(f: &mut Frame, area: Rect, app: &App, title: &str, lines: Vec<Line<'static>>) {
    let paragraph = Paragraph::new(lines)
        .block(main_block(app, title.to_string()))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

fn render_job_list(f: &mut Frame, area: Rect, app: &mut App) {
    if app.user.is_none() {
        render_notice(
            f,
            area,
            app,
            "回测任务",
            vec![
                Line::from(""),
                Line::from(Span::styled(
                    "⚠ 尚未登录",
                    Style::default().fg(Color::Yellow),
                )),
                Line::from("输入 /login <user_id> <token> [name] 登录后查看你的回测任务"),
            ],
        );
        return;
    }

    // 阻塞错误：没有可用数据，只能重试
    if let Some(err) = app.jobs.error.clone() {
        render_notice(
            f,
            area,
            app,
            "回测任务",
            vec![
                Line::from(""),
                Line::from(Span::styled(
                    "✗ 加载回测任务失败",
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                )),
                Line::from(Span::styled(err, Style::default().fg(Color::Red))),
                Line::from(""),
                Line::from("按 r 重试"),
            ],
        );
        return;
    }

    if !app.jobs.has_loaded {
        render_notice(
            f,
            area,
            app,
            "回测任务",
            vec![Line::from(""), Line::from("正在加载回测任务...")],
        );
        return;
    }

    let mut constraints = Vec::new();
    if app.jobs.toast.is_some() {
        constraints.push(Constraint::Length(3));
    }
    constraints.push(Constraint::Min(0));
    constraints.push(Constraint::Length(3));
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);
    let (toast_area, list_area, gauge_area) = if app.jobs.toast.is_some() {
        (Some(chunks[0]), chunks[1], chunks[2])
    } else {
        (None, chunks[0], chunks[1])
    };

    if let (Some(toast_area), Some(toast)) = (toast_area, app.jobs.toast.as_ref()) {
        let toast = Paragraph::new(Line::from(vec![
            Span::styled(format!("⚠ {}", toast), Style::default().fg(Color::Yellow)),
            Span::styled("  (x 关闭)", Style::default().fg(Color::DarkGray)),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::Yellow)),
        );
        f.render_widget(toast, toast_area);
    }

    let items: Vec<ListItem> = app
        .job_list
        .iter()
        .map(|job| job_list_item(job, app.is_pending_confirmation(&job.job_id)))
        .collect();

    let loading = if app.jobs.loading { " 刷新中…" } else { "" };
    let header = format!(
        "回测任务 {}/{} [过滤: {} | 排序: {} {}]{}",
        app.job_list.len(),
        app.jobs.jobs.len(),
        app.projection.filter.label(),
        app.projection.sort_key.as_str(),
        app.projection.sort_order.as_str(),
        loading
    );
    let title = if app.focus_area == FocusArea::MainView {
        format!("{} (f 过滤 s 排序 o 方向 c 取消 w 跟踪 Enter 打开 r 刷新)", header)
    } else {
        header
    };

    if items.is_empty() {
        let hint = if app.jobs.jobs.is_empty() {
            "暂无回测任务，使用 /submit 提交一个"
        } else {
            "当前过滤条件下没有任务 (f 切换过滤)"
        };
        render_notice(f, list_area, app, &title, vec![Line::from(""), Line::from(hint)]);
    } else {
        let list = List::new(items)
            .block(main_block(app, title))
            .highlight_style(
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::White)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol(">> ");
        app.job_list_state.select(Some(app.selected_index));
        f.render_stateful_widget(list, list_area, &mut app.job_list_state);
    }

    render_selected_gauge(f, gauge_area, app.selected_job());
}

fn job_list_item(job: &JobRecord, cancelling: bool) -> ListItem<'static> {
    let (symbol, color) = status_style(job.status);
    let mut spans = vec![
        Span::styled(format!("{} ", symbol), Style::default().fg(color)),
        Span::styled(
            format!("{:<10}", job.status.as_str()),
            Style::default().fg(color),
        ),
        Span::raw(format!("{} ", progress_bar(job.progress_pct(), 10))),
        Span::styled(
            format!("{:<24}", job.display_name()),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(
            " {:<4} {:<20} ",
            job.timeframe.as_deref().unwrap_or("N/A"),
            if job.assets.is_empty() {
                na()
            } else {
                job.assets.join(",")
            }
        )),
        Span::styled(
            format_timestamp(job.created_at.as_deref()),
            Style::default().fg(Color::DarkGray),
        ),
    ];
    if cancelling {
        spans.push(Span::styled(
            " (取消确认中)",
            Style::default().fg(Color::Yellow),
        ));
    }
    ListItem::new(Line::from(spans))
}

fn render_selected_gauge(f: &mut Frame, area: Rect, job: Option<&JobRecord>) {
    let Some(job) = job else {
        f.render_widget(Block::default().borders(Borders::ALL), area);
        return;
    };
    let (_, color) = status_style(job.status);
    let pct = job.progress_pct();
    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("{} ({})", job.display_name(), job.job_id)),
        )
        .gauge_style(Style::default().fg(color))
        .percent(pct.round() as u16)
        .label(format!("{:.0}% {}", pct, job.status.as_str()));
    f.render_widget(gauge, area);
}

fn render_summary(f: &mut Frame, area: Rect, app: &App) {
    let stats = app.stats();
    let row = |label: &str, n: usize, color: Color| {
        Line::from(Span::styled(
            format!("  {:<8}: {:>4}", label, n),
            Style::default().fg(color),
        ))
    };
    let mode = match app.jobs.mode {
        Some(PollMode::Active) => "活跃 (5 秒)",
        Some(PollMode::Idle) => "空闲 (20 秒)",
        None => "N/A",
    };
    let content = vec![
        Line::from(Span::styled(
            "--- 任务概览 ---",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(format!(
            "  总计任务: {:>4}  (进行中 {})",
            stats.total,
            stats.active()
        )),
        row("待处理", stats.pending, Color::Yellow),
        row("运行中", stats.running, Color::Cyan),
        row("已完成", stats.completed, Color::Green),
        row("失败", stats.failed, Color::Red),
        row("已取消", stats.cancelled, Color::Gray),
        Line::from(""),
        Line::from(format!("  轮询模式: {}", mode)),
        Line::from(Span::styled(
            "提示: 有待处理或运行中的任务时每 5 秒刷新，否则每 20 秒",
            Style::default()
                .fg(Color::Gray)
                .add_modifier(Modifier::ITALIC),
        )),
    ];
    let title = if app.focus_area == FocusArea::MainView {
        "任务统计 (x 返回, ← 切换菜单)"
    } else {
        "任务统计"
    };
    let paragraph = Paragraph::new(content).block(main_block(app, title.to_string()));
    f.render_widget(paragraph, area);
}

fn field(label: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!("{:<10}", label),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(value),
    ])
}

fn render_detail(f: &mut Frame, area: Rect, app: &App) {
    let content = match app.detail_job() {
        Some(job) => {
            let (symbol, color) = status_style(job.status);
            let mut lines = vec![
                Line::from(vec![
                    Span::styled(
                        format!("{} ", job.display_name()),
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(
                        format!("{} {}", symbol, job.status.as_str()),
                        Style::default().fg(color),
                    ),
                ]),
                field("任务 ID:", job.job_id.clone()),
                field("描述:", job.strategy_description.clone().unwrap_or_else(na)),
                field(
                    "优先级:",
                    job.priority
                        .map(|p| format!("{:?}", p).to_lowercase())
                        .unwrap_or_else(na),
                ),
                field("周期:", job.timeframe.clone().unwrap_or_else(na)),
                field(
                    "资产:",
                    if job.assets.is_empty() {
                        na()
                    } else {
                        job.assets.join(", ")
                    },
                ),
                field("回测区间:", job.period.clone().unwrap_or_else(na)),
                field("初始资金:", fmt_money(job.initial_capital)),
                field("进度:", progress_bar(job.progress_pct(), 20)),
                Line::from(""),
                field("创建:", format_timestamp(job.created_at.as_deref())),
                field("开始:", format_timestamp(job.started_at.as_deref())),
                field("结束:", format_timestamp(job.completed_at.as_deref())),
                field("预计耗时:", fmt_secs(job.estimated_duration)),
                field("实际耗时:", fmt_secs(job.actual_duration)),
            ];
            if let Some(err) = &job.error_message {
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled(
                    format!("✗ {}", err),
                    Style::default().fg(Color::Red),
                )));
            }
            if let Some(id) = job.result_id() {
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled(
                    format!("结果: {} (/result {} 查看)", id, id),
                    Style::default().fg(Color::Green),
                )));
            }
            if app.watched.as_ref().map(|w| &w.job_id) == Some(&job.job_id)
                && !job.status.is_terminal()
            {
                lines.push(Line::from(Span::styled(
                    "跟踪中，每 3 秒刷新 (/watch stop 停止)",
                    Style::default()
                        .fg(Color::Gray)
                        .add_modifier(Modifier::ITALIC),
                )));
            }
            lines
        }
        None => vec![Line::from("未选择任务：在任务列表中按 Enter 或 w，或输入 /watch <job_id>")],
    };

    let title = if app.focus_area == FocusArea::MainView {
        "任务详情 (↑↓ 滚动, x 返回)"
    } else {
        "任务详情"
    };
    let paragraph = Paragraph::new(content)
        .block(main_block(app, title.to_string()))
        .scroll((app.detail_scroll, 0));
    f.render_widget(paragraph, area);
}

fn result_summary(result: &BacktestResult) -> Vec<Line<'static>> {
    let p = &result.performance;
    vec![
        Line::from(vec![
            Span::styled(
                format!("{} ", result.name.as_deref().unwrap_or("N/A")),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("[{}]", result.id),
                Style::default().fg(Color::DarkGray),
            ),
        ]),
        Line::from(format!(
            "周期: {:<6} 资产: {:<20} 区间: {}",
            result.timeframe.as_deref().unwrap_or("N/A"),
            if result.assets.is_empty() {
                na()
            } else {
                result.assets.join(",")
            },
            result.period.as_deref().unwrap_or("N/A")
        )),
        Line::from(format!(
            "初始资金: {:<14} 最终资金: {}",
            fmt_money(result.initial_capital),
            fmt_money(result.final_capital)
        )),
        Line::from(""),
        Line::from(format!(
            "胜率: {:<10} 盈亏比: {:<8} 交易数: {:<8} 平均收益: {}",
            fmt_num(p.win_rate, 2, "%"),
            fmt_num(p.profit_factor, 2, ""),
            p.total_trades.map(|n| n.to_string()).unwrap_or_else(na),
            fmt_num(p.avg_return, 2, "%")
        )),
        Line::from(format!(
            "最大回撤: {:<8} Sharpe: {:<8} Sortino: {:<8} Calmar: {}",
            fmt_num(p.max_drawdown, 2, "%"),
            fmt_num(p.sharpe_ratio, 2, ""),
            fmt_num(p.sortino_ratio, 2, ""),
            fmt_num(p.calmar_ratio, 2, "")
        )),
    ]
}

fn render_result(f: &mut Frame, area: Rect, app: &App) {
    let Some(result) = app.result.as_ref() else {
        render_notice(
            f,
            area,
            app,
            "回测结果",
            vec![
                Line::from(""),
                Line::from("尚未加载回测结果：在已完成的任务上按 Enter，或输入 /result <backtest_id>"),
            ],
        );
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(8), Constraint::Min(0)])
        .split(area);

    let title = if app.focus_area == FocusArea::MainView {
        "回测结果 (↑↓ 滚动, x 返回)"
    } else {
        "回测结果"
    };
    let summary = Paragraph::new(result_summary(result))
        .block(main_block(app, title.to_string()))
        .scroll((app.detail_scroll, 0));
    f.render_widget(summary, chunks[0]);

    let chart_block = Block::default().borders(Borders::ALL).title("资金曲线");
    let Some(bounds) = result.chart_data.bounds() else {
        let empty = Paragraph::new("无图表数据")
            .block(chart_block)
            .alignment(Alignment::Center);
        f.render_widget(empty, chunks[1]);
        return;
    };

    let series = chart_series(&result.chart_data);
    let datasets: Vec<Dataset> = series
        .iter()
        .enumerate()
        .map(|(i, (label, points))| {
            Dataset::default()
                .name(label.clone())
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(SERIES_COLORS[i % SERIES_COLORS.len()]))
                .data(points)
        })
        .collect();

    let x_max = result.chart_data.max_len().saturating_sub(1).max(1) as f64;
    let labels = &result.chart_data.labels;
    let x_labels = vec![
        Span::raw(labels.first().cloned().unwrap_or_default()),
        Span::raw(labels.last().cloned().unwrap_or_default()),
    ];
    let y_bounds = padded_bounds(bounds);
    let y_labels = vec![
        Span::raw(format!("{:.0}", y_bounds[0])),
        Span::raw(format!("{:.0}", (y_bounds[0] + y_bounds[1]) / 2.0)),
        Span::raw(format!("{:.0}", y_bounds[1])),
    ];

    let chart = Chart::new(datasets)
        .block(chart_block)
        .x_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, x_max])
                .labels(x_labels),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds(y_bounds)
                .labels(y_labels),
        );
    f.render_widget(chart, chunks[1]);
}

fn highlight() -> Style {
    Style::default()
        .fg(Color::Black)
        .bg(Color::White)
        .add_modifier(Modifier::BOLD)
}

fn join_assets(assets: &[String]) -> String {
    if assets.is_empty() {
        na()
    } else {
        assets.join(",")
    }
}

fn with_keys(app: &App, title: String, keys: &str) -> String {
    if app.focus_area == FocusArea::MainView {
        format!("{} ({})", title, keys)
    } else {
        title
    }
}

fn feed_list_item(item: &FeedItem) -> ListItem<'static> {
    let (tag, color) = match item.kind() {
        Some(FeedKind::Signal) => ("信号", Color::Cyan),
        Some(FeedKind::Backtest) => ("回测", Color::Magenta),
        None => ("未知", Color::Gray),
    };
    let author = format!(
        "{}{}",
        item.user.name.as_deref().unwrap_or("匿名"),
        if item.user.verified { " ✓" } else { "" }
    );
    let p = &item.performance;
    ListItem::new(Line::from(vec![
        Span::styled(format!("[{}] ", tag), Style::default().fg(color)),
        Span::styled(
            format!("{:<26}", item.title()),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(
            " {:<4} {:<20} ",
            item.timeframe().unwrap_or("N/A"),
            join_assets(item.assets())
        )),
        Span::styled(
            format!(
                "胜率 {:<7} 收益 {:<7} ",
                fmt_num(p.win_rate, 1, "%"),
                fmt_num(p.avg_return, 1, "%")
            ),
            Style::default().fg(Color::Green),
        ),
        Span::styled(
            format!("{:<18} ♥{}", author, item.likes.unwrap_or(0)),
            Style::default().fg(Color::DarkGray),
        ),
    ]))
}

fn render_feed(f: &mut Frame, area: Rect, app: &mut App) {
    let q = &app.feed_query;
    let pages = app
        .feed_info
        .total_pages
        .map(|n| n.to_string())
        .unwrap_or_else(na);
    let header = format!(
        "社区动态 {}/{} 页 共 {} 条 [{}]",
        q.page,
        pages,
        app.feed_info
            .total_items
            .map(|n| n.to_string())
            .unwrap_or_else(na),
        q.describe()
    );
    let title = with_keys(app, header, "n/p 翻页 t 类型 Enter 查看 r 刷新");

    if !app.feed.loaded {
        render_notice(f, area, app, &title, vec![Line::from(""), Line::from("正在加载社区动态...")]);
        return;
    }
    if app.feed.items.is_empty() {
        render_notice(
            f,
            area,
            app,
            &title,
            vec![Line::from(""), Line::from("没有符合条件的动态 (t 切换类型或 /feed 重新查询)")],
        );
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(4)])
        .split(area);
    let items: Vec<ListItem> = app.feed.items.iter().map(feed_list_item).collect();
    let list = List::new(items)
        .block(main_block(app, title))
        .highlight_style(highlight())
        .highlight_symbol(">> ");
    f.render_stateful_widget(list, chunks[0], &mut app.feed.state);

    let preview = match app.feed.selected() {
        Some(item) => {
            let mut lines = Vec::new();
            if let Some(sig) = &item.signal {
                lines.push(Line::from(format!(
                    "入场: {}  目标: {}  止损: {}  置信度: {}",
                    sig.entry.as_deref().unwrap_or("N/A"),
                    sig.target.as_deref().unwrap_or("N/A"),
                    sig.stop_loss.as_deref().unwrap_or("N/A"),
                    fmt_num(sig.confidence, 0, "%")
                )));
            }
            if let Some(bt) = &item.backtest {
                lines.push(Line::from(format!(
                    "区间: {}  初始资金: {}  最终资金: {}",
                    bt.period.as_deref().unwrap_or("N/A"),
                    fmt_money(bt.initial_capital),
                    fmt_money(bt.final_capital)
                )));
            }
            lines.push(Line::from(Span::styled(
                format!(
                    "{}  评论 {} 分享 {}",
                    format_timestamp(item.timestamp.as_deref()),
                    item.comments.unwrap_or(0),
                    item.shares.unwrap_or(0)
                ),
                Style::default().fg(Color::DarkGray),
            )));
            lines
        }
        None => Vec::new(),
    };
    let preview = Paragraph::new(preview)
        .block(Block::default().borders(Borders::ALL).title("摘要"))
        .wrap(Wrap { trim: true });
    f.render_widget(preview, chunks[1]);
}

fn signal_status_style(status: SignalStatus) -> (&'static str, Color) {
    match status {
        SignalStatus::Active => ("▶", Color::Green),
        SignalStatus::Paused => ("‖", Color::Yellow),
        SignalStatus::Draft => ("○", Color::Gray),
    }
}

fn signal_list_item(signal: &Signal) -> ListItem<'static> {
    let status = signal.status_or_default();
    let (symbol, color) = signal_status_style(status);
    ListItem::new(Line::from(vec![
        Span::styled(
            format!("{} {:<7}", symbol, status.as_str()),
            Style::default().fg(color),
        ),
        Span::styled(
            format!("{:<26}", signal.display_name()),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(
            " {:<4} {:<20} ",
            signal.timeframe.as_deref().unwrap_or("N/A"),
            join_assets(&signal.assets)
        )),
        Span::styled(
            format!(
                "{:<16} {}",
                signal.id.as_deref().unwrap_or("N/A"),
                format_timestamp(signal.created_at.as_deref())
            ),
            Style::default().fg(Color::DarkGray),
        ),
    ]))
}

fn render_signals(f: &mut Frame, area: Rect, app: &mut App) {
    let title = with_keys(
        app,
        format!("我的信号 ({})", app.signals.items.len()),
        "p 暂停/启用 d 删除 r 刷新",
    );
    if app.user.is_none() {
        render_notice(f, area, app, &title, vec![Line::from(""), Line::from("登录后查看你的信号")]);
        return;
    }
    if !app.signals.loaded {
        render_notice(f, area, app, &title, vec![Line::from(""), Line::from("正在加载信号...")]);
        return;
    }
    if app.signals.items.is_empty() {
        render_notice(
            f,
            area,
            app,
            &title,
            vec![
                Line::from(""),
                Line::from("还没有信号，使用 /signal create <name> <timeframe> <ASSET,...> 创建"),
            ],
        );
        return;
    }
    let items: Vec<ListItem> = app.signals.items.iter().map(signal_list_item).collect();
    let list = List::new(items)
        .block(main_block(app, title))
        .highlight_style(highlight())
        .highlight_symbol(">> ");
    f.render_stateful_widget(list, area, &mut app.signals.state);
}

fn backtest_list_item(result: &BacktestResult) -> ListItem<'static> {
    let ret = result.total_return_pct();
    let color = match ret {
        Some(r) if r < 0.0 => Color::Red,
        Some(_) => Color::Green,
        None => Color::Gray,
    };
    ListItem::new(Line::from(vec![
        Span::styled(
            format!("{:<26}", result.display_name()),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(
            " {:<4} {:<20} ",
            result.timeframe.as_deref().unwrap_or("N/A"),
            join_assets(&result.assets)
        )),
        Span::styled(
            format!("收益 {:<9}", fmt_num(ret, 2, "%")),
            Style::default().fg(color),
        ),
        Span::raw(format!(
            " Sharpe {:<6} ",
            fmt_num(result.performance.sharpe_ratio, 2, "")
        )),
        Span::styled(
            format!("{} {}", result.id, format_timestamp(result.created_at.as_deref())),
            Style::default().fg(Color::DarkGray),
        ),
    ]))
}

fn render_backtests(f: &mut Frame, area: Rect, app: &mut App) {
    let title = with_keys(
        app,
        format!("我的回测 ({})", app.backtests.items.len()),
        "Enter 查看 r 刷新",
    );
    if app.user.is_none() {
        render_notice(f, area, app, &title, vec![Line::from(""), Line::from("登录后查看你的回测")]);
        return;
    }
    if !app.backtests.loaded {
        render_notice(f, area, app, &title, vec![Line::from(""), Line::from("正在加载回测...")]);
        return;
    }
    if app.backtests.items.is_empty() {
        render_notice(f, area, app, &title, vec![Line::from(""), Line::from("暂无回测结果")]);
        return;
    }
    let items: Vec<ListItem> = app.backtests.items.iter().map(backtest_list_item).collect();
    let list = List::new(items)
        .block(main_block(app, title))
        .highlight_style(highlight())
        .highlight_symbol(">> ");
    f.render_stateful_widget(list, area, &mut app.backtests.state);
}

fn render_metrics(f: &mut Frame, area: Rect, app: &App) {
    let m = &app.metrics;
    let content = vec![
        Line::from(Span::styled(
            "--- API 调用指标 ---",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(format!("  调用次数: {:>6}", m.call_count)),
        Line::from(Span::styled(
            format!("  成功    : {:>6}", m.succeeded),
            Style::default().fg(Color::Green),
        )),
        Line::from(Span::styled(
            format!("  失败    : {:>6}", m.failed),
            Style::default().fg(Color::Red),
        )),
        Line::from(format!("  平均耗时: {:>6}", format_ms(m.average_ms()))),
        Line::from(format!(
            "  总耗时  : {:>6}",
            format_ms((m.call_count > 0).then_some(m.total_ms))
        )),
    ];
    let title = if app.focus_area == FocusArea::MainView {
        "API 指标 (x 返回)"
    } else {
        "API 指标"
    };
    let paragraph = Paragraph::new(content).block(main_block(app, title.to_string()));
    f.render_widget(paragraph, area);
}

fn render_bottom_bar(f: &mut Frame, area: Rect, app: &App) {
    let bottom_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(0)])
        .split(area);

    // 命令输入区域
    let command_prompt = if app.input_mode == InputMode::Command {
        let mut spans = vec![Span::styled(
            "命令: ",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )];
        let split = app
            .command_input
            .char_indices()
            .nth(app.command_cursor)
            .map(|(i, _)| i)
            .unwrap_or(app.command_input.len());
        let (left, right) = app.command_input.split_at(split);
        spans.push(Span::raw(left.to_string()));
        spans.push(Span::styled("_", Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(right.to_string()));

        // 补全建议显示为灰色幽灵文本
        if let Some(hint) = app.get_completion_hint() {
            spans.push(Span::styled(hint, Style::default().fg(Color::DarkGray)));
        }

        vec![
            Line::from(spans),
            Line::from("Enter执行 Esc取消 Tab补全 ←→光标 Home/End ↑历史 ↓下一条"),
        ]
    } else {
        vec![
            Line::from(vec![
                Span::styled("命令: ", Style::default().fg(Color::Yellow)),
                Span::raw("(按 / 进入命令模式, /help 查看命令)"),
            ]),
            Line::from(match app.view_mode {
                ViewMode::Feed => "←→切换 ↑↓导航 Enter查看 n/p翻页 t类型 r刷新 x返回 q退出",
                ViewMode::Signals => "←→切换 ↑↓导航 p暂停/启用 d删除 r刷新 x返回 q退出",
                ViewMode::Backtests => "←→切换 ↑↓导航 Enter查看 r刷新 x返回 q退出",
                _ => "←→切换 ↑↓导航 Enter打开 f过滤 s排序 o方向 r刷新 c取消 w跟踪 x返回 q退出",
            }),
        ]
    };
    let command_paragraph = Paragraph::new(command_prompt).block(
        Block::default()
            .borders(Borders::ALL)
            .title(if app.input_mode == InputMode::Command {
                "命令输入模式"
            } else {
                "命令输入"
            })
            .style(if app.input_mode == InputMode::Command {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::White)
            }),
    );
    f.render_widget(command_paragraph, bottom_chunks[0]);

    // 最新的日志在顶部
    let log_items: Vec<ListItem> = app
        .log_messages
        .iter()
        .rev()
        .take(20)
        .map(|msg| {
            let style = if msg.starts_with('✓') {
                Style::default().fg(Color::Green)
            } else if msg.starts_with('✗') {
                Style::default().fg(Color::Red)
            } else if msg.starts_with('⚠') {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::White)
            };
            ListItem::new(msg.as_str()).style(style)
        })
        .collect();

    let log = List::new(log_items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("日志 (共 {} 条)", app.log_messages.len()))
            .style(Style::default().fg(Color::White)),
    );
    f.render_widget(log, bottom_chunks[1]);
}
