use super::metrics::MetricsSink;
use super::types::{ApiError, JobsApi, SignalsApi};
use super::urls::*;
use crate::jobs::model::{
    BacktestResult, CreateJobRequest, CreateJobResponse, JobListResponse, JobRecord,
};
use crate::lenient;
use crate::signals::model::USER_ITEMS_LIMIT;
use crate::signals::{FeedPage, FeedQuery, Signal, SignalDraft, SignalUpdate};
use async_trait::async_trait;
use log::{info, warn};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 回测后端 HTTP 客户端
///
/// 所有请求带 `Content-Type: application/json`，登录后附带 Bearer token。
/// 每次调用的耗时与成败上报给注入的 MetricsSink。
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    jobs_limit: usize,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl ApiClient {
    /// 创建客户端
    ///
    /// # 参数
    ///
    /// * `base_url` - 后端地址（如 "http://localhost:3000"）
    /// * `token` - 可选的 Bearer token
    /// * `metrics` - 可选的调用指标接收端
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        metrics: Option<Arc<dyn MetricsSink>>,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("rustbt/0.1")
            .build()
            .map_err(|e| ApiError::Http(format!("无法创建 HTTP 客户端: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            jobs_limit: DEFAULT_JOBS_LIMIT,
            metrics,
        })
    }

    pub fn with_jobs_limit(mut self, limit: usize) -> Self {
        self.jobs_limit = limit.clamp(1, MAX_JOBS_LIMIT);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn decorate(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.header(reqwest::header::CONTENT_TYPE, "application/json");
        match &self.token {
            Some(t) => builder.bearer_auth(t),
            None => builder,
        }
    }

    /// 发送请求并统一处理状态码 / 指标
    async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let started = Instant::now();
        let result = match self.decorate(builder).send().await {
            Ok(resp) if resp.status().is_success() => Ok(resp),
            Ok(resp) => Err(Self::status_error(resp).await),
            Err(e) => Err(ApiError::from(e)),
        };
        if let Some(sink) = &self.metrics {
            sink.track_api_call(started.elapsed(), result.is_ok());
        }
        result
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let resp = self.send(builder).await?;
        let text = resp.text().await?;
        if text.trim().is_empty() {
            // 空 body 按 null 解析，交给目标类型决定是否接受
            return serde_json::from_str("null").map_err(ApiError::from);
        }
        serde_json::from_str(&text).map_err(|e| {
            ApiError::Decode(format!("{}, 原始报文: {}", e, truncate(&text, 200)))
        })
    }

    async fn status_error(resp: Response) -> ApiError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let message = error_message_from_body(&body).unwrap_or_else(|| {
            format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )
        });
        if status == StatusCode::NOT_FOUND {
            ApiError::NotFound(message)
        } else {
            ApiError::Status {
                code: status.as_u16(),
                message,
            }
        }
    }
}

/// 从错误响应体中提取可读信息（FastAPI 用 detail，其他接口用 message）
pub(crate) fn error_message_from_body(body: &str) -> Option<String> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "detail", "error"]
        .iter()
        .find_map(|k| v.get(*k).and_then(|m| m.as_str()))
        .map(|s| s.to_string())
        .filter(|s| !s.trim().is_empty())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push('…');
        out
    }
}

#[async_trait]
impl JobsApi for ApiClient {
    async fn list_user_jobs(&self, user_id: &str) -> Result<JobListResponse, ApiError> {
        let url = self.url(&path_user_backtest_jobs(user_id, self.jobs_limit));
        let resp: Option<JobListResponse> = self.send_json(self.client.get(&url)).await?;
        info!("{} list_user_jobs(...) [{}]", self, url);
        Ok(resp.unwrap_or_default())
    }

    async fn get_job(&self, job_id: &str) -> Result<JobRecord, ApiError> {
        let url = self.url(&path_backtest_job(job_id));
        self.send_json(self.client.get(&url)).await
    }

    async fn cancel_job(&self, job_id: &str) -> Result<(), ApiError> {
        let url = self.url(&path_backtest_job(job_id));
        self.send(self.client.delete(&url)).await?;
        info!("{} cancel_job(...) [{}]", self, url);
        Ok(())
    }

    async fn create_job(&self, req: &CreateJobRequest) -> Result<CreateJobResponse, ApiError> {
        let url = self.url(PATH_BACKTEST_JOBS);
        let resp: CreateJobResponse = self.send_json(self.client.post(&url).json(req)).await?;
        info!("{} create_job(...) [{}] -> {}", self, url, resp.job_id);
        Ok(resp)
    }

    async fn get_backtest(&self, backtest_id: &str) -> Result<BacktestResult, ApiError> {
        let url = self.url(&path_backtest(backtest_id));
        self.send_json(self.client.get(&url)).await
    }

    async fn health(&self) -> Result<String, ApiError> {
        let url = self.url(PATH_HEALTH);
        let resp = self.send(self.client.get(&url)).await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if body.trim().is_empty() {
            Ok(format!("HTTP {}", status.as_u16()))
        } else {
            Ok(truncate(body.trim(), 120))
        }
    }
}

/// 列表接口可能直接返回数组，也可能包在 `signals` / `backtests` / `items` / `data` 里
fn list_from<T: DeserializeOwned>(v: Value, key: &str) -> Result<Vec<T>, ApiError> {
    lenient::items_in(v.clone(), &[key, "items", "data"]).ok_or_else(|| {
        ApiError::Decode(format!(
            "无法识别的列表响应: {}",
            truncate(&v.to_string(), 200)
        ))
    })
}

/// 新建信号的响应可能是信号本身，也可能包在 `signal` 里
fn created_signal(v: Value) -> Option<Signal> {
    let inner = match v {
        Value::Object(mut map) if map.contains_key("signal") => map.remove("signal")?,
        other => other,
    };
    serde_json::from_value::<Signal>(inner)
        .ok()
        .filter(|s| s.id.is_some() || s.name.is_some())
}

#[async_trait]
impl SignalsApi for ApiClient {
    async fn feed(&self, query: &FeedQuery) -> Result<FeedPage, ApiError> {
        let url = self.url(PATH_FEED);
        let resp: Option<FeedPage> = self
            .send_json(self.client.get(&url).query(&query.params()))
            .await?;
        info!("{} feed({}) [{}]", self, query.describe(), url);
        Ok(resp.unwrap_or_default())
    }

    async fn user_signals(&self, user_id: &str) -> Result<Vec<Signal>, ApiError> {
        let url = self.url(&path_user_signals(user_id));
        let v: Value = self
            .send_json(self.client.get(&url).query(&[("limit", USER_ITEMS_LIMIT)]))
            .await?;
        list_from(v, "signals")
    }

    async fn create_signal(&self, draft: &SignalDraft) -> Result<Signal, ApiError> {
        let url = self.url(PATH_SIGNALS);
        let v: Value = self.send_json(self.client.post(&url).json(draft)).await?;
        info!("{} create_signal(...) [{}]", self, url);
        Ok(created_signal(v).unwrap_or_else(|| {
            warn!("新建信号的响应无法解析，使用提交内容展示");
            draft.to_signal()
        }))
    }

    async fn update_signal(&self, signal_id: &str, update: &SignalUpdate) -> Result<(), ApiError> {
        let url = self.url(&path_signal(signal_id));
        self.send(self.client.put(&url).json(update)).await?;
        info!("{} update_signal(...) [{}] -> {}", self, url, update.status);
        Ok(())
    }

    async fn delete_signal(&self, signal_id: &str) -> Result<(), ApiError> {
        let url = self.url(&path_signal(signal_id));
        self.send(self.client.delete(&url)).await?;
        info!("{} delete_signal(...) [{}]", self, url);
        Ok(())
    }

    async fn user_backtests(&self, user_id: &str) -> Result<Vec<BacktestResult>, ApiError> {
        let url = self.url(&path_user_backtests(user_id));
        let v: Value = self
            .send_json(self.client.get(&url).query(&[("limit", USER_ITEMS_LIMIT)]))
            .await?;
        list_from(v, "backtests")
    }
}

impl std::fmt::Display for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<ApiClient [{}]>", self.base_url)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // token 不输出
        write!(
            f,
            "<ApiClient [{}] auth={}>",
            self.base_url,
            self.token.is_some()
        )
    }
}
