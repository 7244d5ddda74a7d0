use crate::jobs::model::{
    BacktestResult, CreateJobRequest, CreateJobResponse, JobListResponse, JobRecord,
};
use crate::signals::{FeedPage, FeedQuery, Signal, SignalDraft, SignalUpdate};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("网络请求失败: {0}")]
    Http(String),
    #[error("{message}")]
    Status { code: u16, message: String },
    #[error("响应解析失败: {0}")]
    Decode(String),
    #[error("未找到: {0}")]
    NotFound(String),
}

impl ApiError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { code, .. } => Some(*code),
            ApiError::NotFound(_) => Some(404),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Http(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

/// 后端回测任务接口。HTTP 实现与 mock 实现都走这里。
#[async_trait]
pub trait JobsApi: Send + Sync {
    async fn list_user_jobs(&self, user_id: &str) -> Result<JobListResponse, ApiError>;
    async fn get_job(&self, job_id: &str) -> Result<JobRecord, ApiError>;
    async fn cancel_job(&self, job_id: &str) -> Result<(), ApiError>;
    async fn create_job(&self, req: &CreateJobRequest) -> Result<CreateJobResponse, ApiError>;
    async fn get_backtest(&self, backtest_id: &str) -> Result<BacktestResult, ApiError>;
    async fn health(&self) -> Result<String, ApiError>;
}

/// 社区动态、个人信号与个人回测接口
#[async_trait]
pub trait SignalsApi: Send + Sync {
    async fn feed(&self, query: &FeedQuery) -> Result<FeedPage, ApiError>;
    async fn user_signals(&self, user_id: &str) -> Result<Vec<Signal>, ApiError>;
    async fn create_signal(&self, draft: &SignalDraft) -> Result<Signal, ApiError>;
    async fn update_signal(&self, signal_id: &str, update: &SignalUpdate) -> Result<(), ApiError>;
    async fn delete_signal(&self, signal_id: &str) -> Result<(), ApiError>;
    async fn user_backtests(&self, user_id: &str) -> Result<Vec<BacktestResult>, ApiError>;
}

/// 同一后端的两组接口，一起替换（登录后换带 token 的客户端）
#[derive(Clone)]
pub struct Backend {
    pub jobs: Arc<dyn JobsApi>,
    pub signals: Arc<dyn SignalsApi>,
}

impl Backend {
    pub fn new<T: JobsApi + SignalsApi + 'static>(api: Arc<T>) -> Self {
        Self {
            jobs: api.clone(),
            signals: api,
        }
    }
}
