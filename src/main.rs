mod api;
mod app_service;
mod app_state;
mod commands;
mod config;
mod jobs;
mod lenient;
mod signals;
mod storage;
mod ui;

use anyhow::Context;
use chrono::Local;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::app_service::AppService;
use crate::app_state::{App, AppEvent};
use crate::commands::AppCommand;
use crate::config::{load_dotenv, AppConfig};
use crate::ui::draw;

fn init_logging() -> anyhow::Result<()> {
    let ts = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let log_dir = PathBuf::from("logs");
    std::fs::create_dir_all(&log_dir).context("无法创建日志目录")?;
    let log_path = log_dir.join(format!("app-{}.log", ts));
    let log_file = std::fs::File::create(&log_path)
        .with_context(|| format!("无法创建日志文件 {}", log_path.display()))?;
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file))) // 终端归 TUI 使用，日志写文件
        .filter_level(log::LevelFilter::Warn)
        .filter_module("rustbt", log::LevelFilter::Info)
        .filter_module("sqlx", log::LevelFilter::Error)
        .filter_module("sea_orm", log::LevelFilter::Error)
        .init();
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    let mut session_info = Vec::new();
    let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    session_info.push(format!("当前工作目录: {}", current_dir.display()));
    session_info.extend(load_dotenv(&current_dir));

    let config = AppConfig::from_env();
    log::info!("配置: {:?}", config);
    if config.use_mock_api {
        session_info.push("⚠ 使用内置 mock 后端 (USE_MOCK_API)".to_string());
    } else {
        session_info.push(format!("后端地址: {}", config.api_base_url));
    }

    session_info.push("正在初始化数据库...".to_string());
    let db = storage::establish_connection(&config.database_url)
        .await
        .with_context(|| format!("数据库连接失败: {}", config.database_url))?;
    session_info.push("✓ 数据库连接成功".to_string());

    // 创建核心 Channel
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<AppCommand>();
    let (evt_tx, evt_rx) = mpsc::unbounded_channel::<AppEvent>();

    // 单后台任务模型 (Actor)
    let service = AppService::new(config, Arc::new(db), evt_tx).context("无法创建 API 客户端")?;
    let service_task = tokio::spawn(service.run(cmd_rx));

    // TUI 初始化
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(session_info, cmd_tx, evt_rx);
    let res = match app.evt_rx.take() {
        Some(rx) => run_app_loop(&mut terminal, &mut app, rx).await,
        None => Ok(()),
    };

    // 恢复终端
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    // 关闭命令通道，后台 actor 收尾后退出
    drop(app);
    if let Err(e) = service_task.await {
        log::warn!("后台服务异常退出: {}", e);
    }

    res.context("界面循环出错")
}

async fn run_app_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    mut evt_rx: mpsc::UnboundedReceiver<AppEvent>,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| draw(f, app))?;

        while let Ok(event) = evt_rx.try_recv() {
            app.handle_event(event);
        }

        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && app.handle_key_event(key.code) {
                    return Ok(());
                }
            }
        }
    }
}
