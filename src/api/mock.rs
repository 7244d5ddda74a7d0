use super::types::{ApiError, JobsApi, SignalsApi};
use crate::jobs::model::{
    BacktestResult, ChartData, ChartDataset, CreateJobRequest, CreateJobResponse,
    JobListResponse, JobPriority, JobRecord, JobStatus, PerformanceMetrics,
};
use crate::signals::model::{FeedBacktest, FeedUser, DEFAULT_FEED_PAGE_SIZE, FEED_PAGE_SIZES};
use crate::signals::{
    FeedItem, FeedKind, FeedPage, FeedQuery, Signal, SignalDraft, SignalStatus, SignalUpdate,
};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Mutex;

/// pending 任务在被"调度"前需要经历的轮询次数
const PENDING_POLLS: u32 = 2;
const CHART_POINTS: usize = 60;
const FEED_ITEMS: usize = 200;
const FEED_CHART_POINTS: usize = 100;

const FEED_USERS: [&str; 10] = [
    "CryptoTrader_Pro",
    "QuantMaster",
    "AltcoinHunter",
    "BitcoinWhale",
    "ETH_Maximalist",
    "SolanaTrader",
    "DeFi_Expert",
    "TechnicalAnalyst",
    "MomentumTrader",
    "SwingTrader",
];

const FEED_STRATEGIES: [(&str, &str); 8] = [
    ("BTC Momentum Strategy", "Momentum detection using RSI and volume confirmation"),
    ("ETH Scalping System", "High-frequency scalping with tight spreads"),
    ("SOL Breakout Detector", "Breakouts confirmed by volume and price action"),
    ("Multi-Asset Portfolio", "Diversified portfolio across major coins"),
    ("RSI Divergence Trader", "RSI divergence for trend reversals"),
    ("MACD Crossover Pro", "MACD crossover with momentum confirmation"),
    ("Bollinger Band Master", "Band breakout and mean reversion"),
    ("Ichimoku Cloud Master", "Cloud-based trend analysis"),
];

const FEED_ASSETS: [&[&str]; 6] = [
    &["BTC/USD"],
    &["ETH/USD"],
    &["SOL/USD"],
    &["BTC/USD", "ETH/USD"],
    &["ETH/USD", "SOL/USD"],
    &["BTC/USD", "ETH/USD", "SOL/USD"],
];

const FEED_TIMEFRAMES: [&str; 6] = ["1m", "5m", "15m", "1h", "4h", "1d"];

struct MockState {
    rng: StdRng,
    jobs: Vec<JobRecord>,
    /// job_id -> 剩余等待轮询次数
    queued: HashMap<String, u32>,
    results: HashMap<String, BacktestResult>,
    next_id: u64,
    feed: Vec<FeedItem>,
    signals: Vec<Signal>,
    next_signal: u64,
}

/// 内存中的回测后端，离线演示和测试用
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let mut state = MockState {
            rng,
            jobs: Vec::new(),
            queued: HashMap::new(),
            results: HashMap::new(),
            next_id: 1,
            feed: Vec::new(),
            signals: Vec::new(),
            next_signal: 1,
        };
        state.seed();
        state.seed_feed();
        state.seed_signals();
        Self {
            state: Mutex::new(state),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        match self.state.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn now_iso(offset_minutes: i64) -> String {
    (Utc::now() - ChronoDuration::minutes(offset_minutes)).to_rfc3339()
}

impl MockState {
    fn seed(&mut self) {
        let seeds = [
            ("RSI Reversal", JobStatus::Running, "1h", vec!["BTC/USDT"]),
            ("MACD Crossover", JobStatus::Pending, "4h", vec!["ETH/USDT", "SOL/USDT"]),
            ("Bollinger Squeeze", JobStatus::Completed, "1d", vec!["AAPL"]),
            ("Momentum Breakout", JobStatus::Failed, "15m", vec!["TSLA"]),
            ("Mean Reversion", JobStatus::Cancelled, "5m", vec!["EURUSD"]),
        ];
        for (i, (name, status, tf, assets)) in seeds.into_iter().enumerate() {
            let age = 90 - (i as i64) * 15;
            let mut job = self.new_job(name, tf, assets.into_iter().map(String::from).collect());
            job.created_at = Some(now_iso(age));
            job.status = status;
            match status {
                JobStatus::Pending => {
                    self.queued.insert(job.job_id.clone(), PENDING_POLLS);
                }
                JobStatus::Running => {
                    job.started_at = Some(now_iso(age - 1));
                    job.progress = Some(35.0);
                }
                JobStatus::Completed => {
                    job.started_at = Some(now_iso(age - 1));
                    job.completed_at = Some(now_iso(age - 10));
                    job.progress = Some(100.0);
                    self.complete(&mut job);
                }
                JobStatus::Failed => {
                    job.started_at = Some(now_iso(age - 1));
                    job.completed_at = Some(now_iso(age - 2));
                    job.error_message = Some("Insufficient historical data for TSLA".into());
                }
                JobStatus::Cancelled => {
                    job.completed_at = Some(now_iso(age - 1));
                }
            }
            self.jobs.push(job);
        }
    }

    fn new_job(&mut self, name: &str, timeframe: &str, assets: Vec<String>) -> JobRecord {
        let job_id = format!("job_mock_{:04}", self.next_id);
        self.next_id += 1;
        JobRecord {
            job_id,
            status: JobStatus::Pending,
            progress: Some(0.0),
            user_id: None,
            priority: Some(JobPriority::Normal),
            strategy_name: Some(name.to_string()),
            strategy_description: Some("No description".to_string()),
            timeframe: Some(timeframe.to_string()),
            assets,
            period: Some("6 months".to_string()),
            initial_capital: Some(10_000.0),
            created_at: Some(now_iso(0)),
            started_at: None,
            completed_at: None,
            estimated_duration: Some(120.0),
            actual_duration: None,
            error_message: None,
            result_backtest_id: None,
        }
    }

    fn seed_feed(&mut self) {
        for n in 1..=FEED_ITEMS {
            let item = self.feed_item(n);
            self.feed.push(item);
        }
    }

    fn feed_item(&mut self, n: usize) -> FeedItem {
        let user_idx = self.rng.gen_range(0..FEED_USERS.len());
        let (name, description) = FEED_STRATEGIES[self.rng.gen_range(0..FEED_STRATEGIES.len())];
        let assets: Vec<String> = FEED_ASSETS[self.rng.gen_range(0..FEED_ASSETS.len())]
            .iter()
            .map(|a| a.to_string())
            .collect();
        let timeframe = FEED_TIMEFRAMES[self.rng.gen_range(0..FEED_TIMEFRAMES.len())].to_string();
        let kind = if self.rng.gen_bool(0.5) {
            FeedKind::Signal
        } else {
            FeedKind::Backtest
        };

        let base = self.rng.gen_range(1000.0..3000.0);
        let volatility = self.rng.gen_range(0.05..0.2);
        let trend = self.rng.gen_range(-0.02..0.02);
        let strategy = self.wave(base, volatility, trend, 0.1);
        let benchmark = self.wave(base, volatility * 0.6, trend * 0.5, 0.08);
        let avg_return = self.rng.gen_range(2.0..20.0);

        let mut performance = PerformanceMetrics {
            win_rate: Some(self.rng.gen_range(50.0..90.0)),
            profit_factor: Some(self.rng.gen_range(1.2..3.0)),
            total_trades: Some(self.rng.gen_range(20..320)),
            avg_return: Some(avg_return),
            ..PerformanceMetrics::default()
        };
        let (signal, backtest) = match kind {
            FeedKind::Signal => {
                let price = |rng: &mut StdRng, lo: f64, hi: f64| {
                    format!("${:.2}", base * rng.gen_range(lo..hi))
                };
                let signal = Signal {
                    name: Some(name.to_string()),
                    description: Some(description.to_string()),
                    timeframe: Some(timeframe),
                    assets,
                    entry: Some(format!("Buy at {}", price(&mut self.rng, 0.95, 1.05))),
                    target: Some(price(&mut self.rng, 1.05, 1.2)),
                    stop_loss: Some(price(&mut self.rng, 0.85, 0.95)),
                    confidence: Some(self.rng.gen_range(70..100) as f64),
                    ..Signal::default()
                };
                (Some(signal), None)
            }
            FeedKind::Backtest => {
                performance.max_drawdown = Some(-self.rng.gen_range(5.0..25.0));
                performance.sharpe_ratio = Some(self.rng.gen_range(0.5..3.0));
                let initial = self.rng.gen_range(10_000..60_000) as f64;
                let backtest = FeedBacktest {
                    name: Some(name.to_string()),
                    description: Some(description.to_string()),
                    timeframe: Some(timeframe),
                    assets,
                    period: Some(format!("{} months", self.rng.gen_range(1..=12))),
                    initial_capital: Some(initial),
                    final_capital: Some(initial * (1.0 + avg_return / 100.0)),
                };
                (None, Some(backtest))
            }
        };

        let benchmark_label = backtest
            .as_ref()
            .map(|b| &b.assets)
            .or(signal.as_ref().map(|s| &s.assets))
            .and_then(|a| a.first().cloned())
            .unwrap_or_else(|| "Market Average".to_string());
        FeedItem {
            id: n.to_string(),
            kind: Some(kind),
            user: FeedUser {
                name: Some(FEED_USERS[user_idx].to_string()),
                user_id: Some(format!("user_{:03}", user_idx + 1)),
                verified: self.rng.gen_bool(0.7),
                followers: Some(self.rng.gen_range(10..5010)),
            },
            signal,
            backtest,
            performance,
            chart_data: ChartData {
                labels: (0..FEED_CHART_POINTS).map(|i| i.to_string()).collect(),
                datasets: vec![
                    ChartDataset {
                        label: match kind {
                            FeedKind::Signal => "Strategy Performance".into(),
                            FeedKind::Backtest => "Portfolio Value".into(),
                        },
                        data: strategy,
                    },
                    ChartDataset {
                        label: benchmark_label,
                        data: benchmark,
                    },
                ],
            },
            timestamp: Some(now_iso(self.rng.gen_range(0..30 * 24 * 60))),
            likes: Some(self.rng.gen_range(5..505)),
            comments: Some(self.rng.gen_range(1..101)),
            shares: Some(self.rng.gen_range(1..51)),
        }
    }

    /// 线性趋势 + 正弦波动 + 噪声，不低于 0
    fn wave(&mut self, base: f64, volatility: f64, trend: f64, freq: f64) -> Vec<f64> {
        (0..FEED_CHART_POINTS)
            .map(|i| {
                let i = i as f64;
                let noise = self.rng.gen_range(-0.5..0.5) * volatility * 0.5 * base;
                let v = base + i * trend * base + (i * freq).sin() * volatility * base + noise;
                (v.max(0.0) * 100.0).round() / 100.0
            })
            .collect()
    }

    fn seed_signals(&mut self) {
        let seeds = [
            ("BTC Momentum Strategy", SignalStatus::Active, "4h", "BTC/USD"),
            ("SOL Breakout Detector", SignalStatus::Paused, "1d", "SOL/USD"),
            ("ETH Range Trader", SignalStatus::Draft, "1h", "ETH/USD"),
        ];
        for (i, (name, status, tf, asset)) in seeds.into_iter().enumerate() {
            let mut signal = self.new_signal(name, tf, vec![asset.to_string()], status);
            signal.created_at = Some(now_iso(600 - (i as i64) * 120));
            signal.followers = Some(self.rng.gen_range(0..400));
            self.signals.push(signal);
        }
    }

    fn new_signal(
        &mut self,
        name: &str,
        timeframe: &str,
        assets: Vec<String>,
        status: SignalStatus,
    ) -> Signal {
        let id = format!("sig_mock_{}", self.next_signal);
        self.next_signal += 1;
        Signal {
            id: Some(id),
            name: Some(name.to_string()),
            status: Some(status),
            timeframe: Some(timeframe.to_string()),
            assets,
            created_at: Some(now_iso(0)),
            updated_at: Some(now_iso(0)),
            ..Signal::default()
        }
    }

    /// 推进一步：pending 排队结束后开始运行，running 随机前进，满 100 即完成
    fn advance(&mut self) {
        let mut jobs = std::mem::take(&mut self.jobs);
        for job in jobs.iter_mut() {
            match job.status {
                JobStatus::Pending => {
                    let left = self.queued.entry(job.job_id.clone()).or_insert(0);
                    if *left > 0 {
                        *left -= 1;
                    } else {
                        self.queued.remove(&job.job_id);
                        job.status = JobStatus::Running;
                        job.started_at = Some(now_iso(0));
                        job.progress = Some(0.0);
                    }
                }
                JobStatus::Running => {
                    let step: f64 = self.rng.gen_range(8.0..25.0);
                    let next = (job.progress.unwrap_or(0.0) + step).min(100.0);
                    job.progress = Some(next);
                    if next >= 100.0 {
                        job.status = JobStatus::Completed;
                        job.completed_at = Some(now_iso(0));
                        job.actual_duration = Some(self.rng.gen_range(30.0..300.0));
                        self.complete(job);
                    }
                }
                _ => {}
            }
        }
        self.jobs = jobs;
    }

    fn complete(&mut self, job: &mut JobRecord) {
        let id = format!("bt_{}", job.job_id.trim_start_matches("job_"));
        let result = self.generate_result(&id, job);
        job.result_backtest_id = Some(id.clone());
        self.results.insert(id, result);
    }

    /// 随机游走生成资金曲线，附带买入持有基准
    fn generate_result(&mut self, id: &str, job: &JobRecord) -> BacktestResult {
        let initial = job.initial_capital.unwrap_or(10_000.0);
        let mut equity = Vec::with_capacity(CHART_POINTS);
        let mut benchmark = Vec::with_capacity(CHART_POINTS);
        let (mut e, mut b) = (initial, initial);
        for _ in 0..CHART_POINTS {
            equity.push((e * 100.0).round() / 100.0);
            benchmark.push((b * 100.0).round() / 100.0);
            e *= 1.0 + self.rng.gen_range(-0.02..0.026);
            b *= 1.0 + self.rng.gen_range(-0.015..0.018);
        }
        let final_capital = equity.last().copied().unwrap_or(initial);

        let mut peak = f64::MIN;
        let mut max_dd = 0.0_f64;
        for v in &equity {
            peak = peak.max(*v);
            if peak > 0.0 {
                max_dd = max_dd.max((peak - v) / peak * 100.0);
            }
        }

        BacktestResult {
            id: id.to_string(),
            name: job.strategy_name.clone(),
            description: job.strategy_description.clone(),
            timeframe: job.timeframe.clone(),
            assets: job.assets.clone(),
            period: job.period.clone(),
            initial_capital: Some(initial),
            final_capital: Some(final_capital),
            performance: PerformanceMetrics {
                win_rate: Some(self.rng.gen_range(35.0..70.0)),
                profit_factor: Some(self.rng.gen_range(0.6..2.5)),
                total_trades: Some(self.rng.gen_range(12..240)),
                avg_return: Some((final_capital / initial - 1.0) * 100.0),
                max_drawdown: Some(max_dd),
                sharpe_ratio: Some(self.rng.gen_range(-0.5..2.8)),
                sortino_ratio: Some(self.rng.gen_range(-0.5..3.5)),
                calmar_ratio: None,
            },
            chart_data: ChartData {
                labels: (1..=CHART_POINTS).map(|d| format!("D{}", d)).collect(),
                datasets: vec![
                    ChartDataset {
                        label: "Equity".into(),
                        data: equity,
                    },
                    ChartDataset {
                        label: "Buy & Hold".into(),
                        data: benchmark,
                    },
                ],
            },
            created_at: job.completed_at.clone().or_else(|| Some(now_iso(0))),
        }
    }
}

#[async_trait]
impl JobsApi for MockBackend {
    async fn list_user_jobs(&self, user_id: &str) -> Result<JobListResponse, ApiError> {
        let jobs = self.with_state(|s| {
            s.advance();
            s.jobs
                .iter()
                .cloned()
                .map(|mut j| {
                    j.user_id = Some(user_id.to_string());
                    j
                })
                .collect::<Vec<_>>()
        });
        Ok(JobListResponse {
            total: Some(jobs.len()),
            jobs,
            user_id: Some(user_id.to_string()),
        })
    }

    async fn get_job(&self, job_id: &str) -> Result<JobRecord, ApiError> {
        self.with_state(|s| {
            s.advance();
            s.jobs.iter().find(|j| j.job_id == job_id).cloned()
        })
        .ok_or_else(|| ApiError::NotFound("Backtest job not found".into()))
    }

    async fn cancel_job(&self, job_id: &str) -> Result<(), ApiError> {
        self.with_state(|s| {
            let job = s
                .jobs
                .iter_mut()
                .find(|j| j.job_id == job_id)
                .ok_or_else(|| ApiError::NotFound("Backtest job not found".into()))?;
            if job.status.is_terminal() {
                return Err(ApiError::Status {
                    code: 400,
                    message: "Backtest job not found or cannot be cancelled".into(),
                });
            }
            job.status = JobStatus::Cancelled;
            job.completed_at = Some(now_iso(0));
            s.queued.remove(job_id);
            Ok(())
        })?;
        info!("<MockBackend> cancel_job({})", job_id);
        Ok(())
    }

    async fn create_job(&self, req: &CreateJobRequest) -> Result<CreateJobResponse, ApiError> {
        let job_id = self.with_state(|s| {
            let mut job = s.new_job(&req.strategy_name, &req.timeframe, req.assets.clone());
            job.user_id = Some(req.user_id.clone());
            job.strategy_description = Some(req.strategy_description.clone());
            job.period = Some(req.period.clone());
            job.initial_capital = Some(req.initial_capital);
            job.priority = Some(req.priority);
            let id = job.job_id.clone();
            s.queued.insert(id.clone(), PENDING_POLLS);
            s.jobs.push(job);
            id
        });
        info!("<MockBackend> create_job -> {}", job_id);
        Ok(CreateJobResponse {
            job_id,
            status: Some(JobStatus::Pending),
            message: Some("Backtest job submitted successfully".into()),
        })
    }

    async fn get_backtest(&self, backtest_id: &str) -> Result<BacktestResult, ApiError> {
        self.with_state(|s| s.results.get(backtest_id).cloned())
            .ok_or_else(|| ApiError::NotFound(format!("Backtest {} not found", backtest_id)))
    }

    async fn health(&self) -> Result<String, ApiError> {
        Ok("mock backend ok".to_string())
    }
}

#[async_trait]
impl SignalsApi for MockBackend {
    async fn feed(&self, query: &FeedQuery) -> Result<FeedPage, ApiError> {
        let limit = if FEED_PAGE_SIZES.contains(&query.limit) {
            query.limit
        } else {
            DEFAULT_FEED_PAGE_SIZE
        };
        let page = query.page.max(1);
        let matched: Vec<FeedItem> = self.with_state(|s| {
            s.feed
                .iter()
                .filter(|item| query.matches(item))
                .cloned()
                .collect()
        });
        let total = matched.len();
        let start = (page - 1) * limit;
        let items: Vec<FeedItem> = matched.into_iter().skip(start).take(limit).collect();
        info!("<MockBackend> feed({}) -> {}/{}", query.describe(), items.len(), total);
        Ok(FeedPage {
            items,
            total_items: Some(total),
            current_page: Some(page),
            total_pages: Some(total.div_ceil(limit)),
            has_next_page: Some(start + limit < total),
            page_size: Some(limit),
        })
    }

    async fn user_signals(&self, _user_id: &str) -> Result<Vec<Signal>, ApiError> {
        Ok(self.with_state(|s| s.signals.clone()))
    }

    async fn create_signal(&self, draft: &SignalDraft) -> Result<Signal, ApiError> {
        let signal = self.with_state(|s| {
            let mut signal = s.new_signal(
                &draft.name,
                &draft.timeframe,
                draft.assets.clone(),
                draft.status,
            );
            signal.description = Some(draft.description.clone());
            s.signals.push(signal.clone());
            signal
        });
        info!("<MockBackend> create_signal -> {:?}", signal.id);
        Ok(signal)
    }

    async fn update_signal(&self, signal_id: &str, update: &SignalUpdate) -> Result<(), ApiError> {
        self.with_state(|s| {
            let signal = s
                .signals
                .iter_mut()
                .find(|x| x.id.as_deref() == Some(signal_id))
                .ok_or_else(|| ApiError::NotFound(format!("Signal {} not found", signal_id)))?;
            signal.status = Some(update.status);
            signal.updated_at = Some(now_iso(0));
            Ok(())
        })
    }

    async fn delete_signal(&self, signal_id: &str) -> Result<(), ApiError> {
        self.with_state(|s| {
            let before = s.signals.len();
            s.signals.retain(|x| x.id.as_deref() != Some(signal_id));
            if s.signals.len() == before {
                Err(ApiError::NotFound(format!("Signal {} not found", signal_id)))
            } else {
                Ok(())
            }
        })?;
        info!("<MockBackend> delete_signal({})", signal_id);
        Ok(())
    }

    async fn user_backtests(&self, _user_id: &str) -> Result<Vec<BacktestResult>, ApiError> {
        let mut results: Vec<BacktestResult> =
            self.with_state(|s| s.results.values().cloned().collect());
        results.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(results)
    }
}

impl std::fmt::Display for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<MockBackend>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeds_one_job_per_status() {
        let api = MockBackend::with_seed(7);
        let jobs = api.with_state(|s| s.jobs.clone());
        for status in JobStatus::ALL {
            assert!(jobs.iter().any(|j| j.status == status), "{}", status);
        }
        let done = jobs.iter().find(|j| j.status == JobStatus::Completed).unwrap();
        let bt = api.get_backtest(done.result_id().unwrap()).await.unwrap();
        assert_eq!(bt.chart_data.datasets.len(), 2);
        assert_eq!(bt.chart_data.max_len(), CHART_POINTS);
    }

    #[tokio::test]
    async fn running_jobs_progress_and_complete() {
        let api = MockBackend::with_seed(42);
        let mut last = 0.0;
        let mut finished = None;
        for _ in 0..20 {
            let resp = api.list_user_jobs("u1").await.unwrap();
            let job = resp
                .jobs
                .iter()
                .find(|j| j.strategy_name.as_deref() == Some("RSI Reversal"))
                .unwrap()
                .clone();
            assert!(job.progress_pct() >= last);
            last = job.progress_pct();
            if job.status == JobStatus::Completed {
                finished = Some(job);
                break;
            }
        }
        let job = finished.expect("running job never completed");
        assert_eq!(job.progress_pct(), 100.0);
        let bt_id = job.result_id().unwrap().to_string();
        assert!(api.get_backtest(&bt_id).await.is_ok());
    }

    #[tokio::test]
    async fn pending_job_starts_after_queued_polls() {
        let api = MockBackend::with_seed(1);
        let req = CreateJobRequest::new("u1", Some("Test".into()), "1h", vec!["BTC".into()]);
        let created = api.create_job(&req).await.unwrap();
        for _ in 0..PENDING_POLLS {
            let j = api.get_job(&created.job_id).await.unwrap();
            assert_eq!(j.status, JobStatus::Pending);
        }
        let j = api.get_job(&created.job_id).await.unwrap();
        assert_eq!(j.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn feed_pages_and_filters() {
        let api = MockBackend::with_seed(11);
        let first = api.feed(&FeedQuery::default()).await.unwrap();
        assert_eq!(first.items.len(), DEFAULT_FEED_PAGE_SIZE);
        assert_eq!(first.total_items, Some(FEED_ITEMS));
        assert_eq!(first.total_pages, Some(FEED_ITEMS / DEFAULT_FEED_PAGE_SIZE));
        assert!(first.has_next());
        assert_eq!(first.items[0].id, "1");
        assert_eq!(first.items[0].chart_data.datasets.len(), 2);

        let signals_only = FeedQuery {
            kind: Some(FeedKind::Signal),
            limit: 50,
            ..FeedQuery::default()
        };
        let page = api.feed(&signals_only).await.unwrap();
        assert!(page.items.iter().all(|i| i.kind() == Some(FeedKind::Signal)));
        assert!(page.total_items.unwrap() < FEED_ITEMS);

        let last_page = FeedQuery {
            page: FEED_ITEMS / 20,
            limit: 20,
            ..FeedQuery::default()
        };
        let page = api.feed(&last_page).await.unwrap();
        assert_eq!(page.items.len(), 20);
        assert!(!page.has_next());
    }

    #[tokio::test]
    async fn invalid_feed_page_size_falls_back_to_default() {
        let api = MockBackend::with_seed(2);
        let odd = FeedQuery {
            limit: 7,
            ..FeedQuery::default()
        };
        let page = api.feed(&odd).await.unwrap();
        assert_eq!(page.page_size, Some(DEFAULT_FEED_PAGE_SIZE));
        assert_eq!(page.items.len(), DEFAULT_FEED_PAGE_SIZE);
    }

    #[tokio::test]
    async fn signal_lifecycle() {
        let api = MockBackend::with_seed(5);
        let seeded = api.user_signals("u1").await.unwrap();
        assert_eq!(seeded.len(), 3);
        assert_eq!(seeded[1].status, Some(SignalStatus::Paused));

        let draft = SignalDraft {
            user_id: "u1".into(),
            name: "DOT Swing".into(),
            description: "No description".into(),
            timeframe: "4h".into(),
            assets: vec!["DOT/USD".into()],
            status: SignalStatus::Active,
        };
        let created = api.create_signal(&draft).await.unwrap();
        let id = created.id.clone().unwrap();
        assert_eq!(api.user_signals("u1").await.unwrap().len(), 4);

        api.update_signal(&id, &SignalUpdate { status: SignalStatus::Paused })
            .await
            .unwrap();
        let after = api.user_signals("u1").await.unwrap();
        let s = after.iter().find(|s| s.id.as_deref() == Some(id.as_str())).unwrap();
        assert_eq!(s.status, Some(SignalStatus::Paused));

        api.delete_signal(&id).await.unwrap();
        assert_eq!(api.user_signals("u1").await.unwrap().len(), 3);
        assert!(matches!(
            api.delete_signal(&id).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn user_backtests_lists_completed_results() {
        let api = MockBackend::with_seed(9);
        let results = api.user_backtests("u1").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name.as_deref(), Some("Bollinger Squeeze"));
        assert!(results[0].created_at.is_some());
    }

    #[tokio::test]
    async fn cancel_only_active_jobs() {
        let api = MockBackend::with_seed(3);
        let jobs = api.with_state(|s| s.jobs.clone());
        let pending = jobs.iter().find(|j| j.status == JobStatus::Pending).unwrap();
        let completed = jobs.iter().find(|j| j.status == JobStatus::Completed).unwrap();

        api.cancel_job(&pending.job_id).await.unwrap();
        let after = api.with_state(|s| s.jobs.clone());
        let p = after.iter().find(|j| j.job_id == pending.job_id).unwrap();
        assert_eq!(p.status, JobStatus::Cancelled);

        let err = api.cancel_job(&completed.job_id).await.unwrap_err();
        assert_eq!(err.status_code(), Some(400));
        assert!(matches!(
            api.cancel_job("nope").await,
            Err(ApiError::NotFound(_))
        ));
    }
}
