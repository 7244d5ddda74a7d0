/// 回测任务相关路径
pub const PATH_BACKTEST_JOBS: &str = "/api/backtest-jobs";

pub fn path_backtest_job(job_id: &str) -> String {
    format!("{}/{}", PATH_BACKTEST_JOBS, job_id)
}

pub fn path_user_backtest_jobs(user_id: &str, limit: usize) -> String {
    format!("{}/user/{}?limit={}", PATH_BACKTEST_JOBS, user_id, limit)
}

/// 回测结果
pub const PATH_BACKTESTS: &str = "/api/backtests";

pub fn path_backtest(backtest_id: &str) -> String {
    format!("{}/{}", PATH_BACKTESTS, backtest_id)
}

/// 社区动态，分页与过滤走查询串
pub const PATH_FEED: &str = "/api/feed";

pub const PATH_SIGNALS: &str = "/api/signals";

pub fn path_signal(signal_id: &str) -> String {
    format!("{}/{}", PATH_SIGNALS, signal_id)
}

pub fn path_user_signals(user_id: &str) -> String {
    format!("/api/users/{}/signals", user_id)
}

pub fn path_user_backtests(user_id: &str) -> String {
    format!("/api/users/{}/backtests", user_id)
}

pub const PATH_HEALTH: &str = "/health";

/// 后端单次最多返回 100 条
pub const MAX_JOBS_LIMIT: usize = 100;
pub const DEFAULT_JOBS_LIMIT: usize = 50;
