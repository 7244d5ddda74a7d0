use crate::api::urls::{DEFAULT_JOBS_LIMIT, MAX_JOBS_LIMIT};
use std::path::Path;

pub const DEV_API_BASE_URL: &str = "http://localhost:3000";
pub const PROD_API_BASE_URL: &str = "https://api.algotraders.dev";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://rustbt.db?mode=rwc";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("production") | Some("prod") => AppEnv::Production,
            _ => AppEnv::Development,
        }
    }

    pub fn default_api_base_url(&self) -> &'static str {
        match self {
            AppEnv::Development => DEV_API_BASE_URL,
            AppEnv::Production => PROD_API_BASE_URL,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub env: AppEnv,
    pub api_base_url: String,
    pub use_mock_api: bool,
    /// mock 后端的随机种子，便于复现演示数据
    pub mock_seed: Option<u64>,
    pub database_url: String,
    pub jobs_limit: usize,
}

fn truthy(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源构建配置，空字符串视为未设置
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let env = AppEnv::parse(get("APP_ENV").as_deref());
        let api_base_url = get("API_BASE_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|| env.default_api_base_url().to_string());
        let use_mock_api = get("USE_MOCK_API").map(|v| truthy(&v)).unwrap_or(false);
        let mock_seed = get("MOCK_SEED").and_then(|v| v.trim().parse::<u64>().ok());
        let database_url = get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let jobs_limit = get("JOBS_LIMIT")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .map(|n| n.clamp(1, MAX_JOBS_LIMIT))
            .unwrap_or(DEFAULT_JOBS_LIMIT);

        Self {
            env,
            api_base_url,
            use_mock_api,
            mock_seed,
            database_url,
            jobs_limit,
        }
    }
}

/// 加载工作目录下的 .env，返回给启动日志用的提示行
pub fn load_dotenv(dir: &Path) -> Vec<String> {
    let mut info = Vec::new();
    let env_path = dir.join(".env");
    if !env_path.exists() {
        info.push(format!("⚠ 未找到 .env 文件: {}", env_path.display()));
        info.push("⚠ 尝试从系统环境变量读取".to_string());
        return info;
    }
    match dotenv::from_path(&env_path) {
        Ok(()) => info.push(format!("✓ 已加载 .env 文件: {}", env_path.display())),
        Err(e) => info.push(format!("⚠ 无法读取 .env 文件: {}", e)),
    }
    info
}
