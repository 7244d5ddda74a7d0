use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::jobs::model::{BacktestResult, ChartData, PerformanceMetrics};
use crate::lenient;

/// 社区动态允许的分页大小，其他值由后端退回 10
pub const FEED_PAGE_SIZES: [usize; 3] = [10, 20, 50];
pub const DEFAULT_FEED_PAGE_SIZE: usize = 10;
/// 我的信号 / 我的回测 单次拉取上限
pub const USER_ITEMS_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Signal,
    Backtest,
}

impl FeedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::Signal => "signal",
            FeedKind::Backtest => "backtest",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "signal" | "signals" => Ok(FeedKind::Signal),
            "backtest" | "backtests" => Ok(FeedKind::Backtest),
            other => Err(format!("未知的动态类型: {}", other)),
        }
    }
}

/// 社区动态查询：分页 + 可选过滤
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedQuery {
    pub page: usize,
    pub limit: usize,
    pub kind: Option<FeedKind>,
    pub timeframe: Option<String>,
    pub user_id: Option<String>,
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_FEED_PAGE_SIZE,
            kind: None,
            timeframe: None,
            user_id: None,
        }
    }
}

impl FeedQuery {
    pub fn with_limit(mut self, limit: usize) -> Result<Self, String> {
        if !FEED_PAGE_SIZES.contains(&limit) {
            return Err(format!(
                "每页条数只能是 {}",
                FEED_PAGE_SIZES.map(|n| n.to_string()).join(" / ")
            ));
        }
        self.limit = limit;
        Ok(self)
    }

    pub fn next_page(&self) -> Self {
        Self {
            page: self.page + 1,
            ..self.clone()
        }
    }

    pub fn prev_page(&self) -> Self {
        Self {
            page: self.page.saturating_sub(1).max(1),
            ..self.clone()
        }
    }

    /// 查询串参数，交给 reqwest `.query()`
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![
            ("page", self.page.to_string()),
            ("limit", self.limit.to_string()),
        ];
        if let Some(kind) = self.kind {
            out.push(("type", kind.as_str().to_string()));
        }
        if let Some(tf) = &self.timeframe {
            out.push(("timeframe", tf.clone()));
        }
        if let Some(user) = &self.user_id {
            out.push(("user_id", user.clone()));
        }
        out
    }

    pub fn describe(&self) -> String {
        let mut parts = vec![format!("第 {} 页", self.page), format!("每页 {}", self.limit)];
        parts.push(match self.kind {
            Some(k) => format!("类型 {}", k),
            None => "全部类型".to_string(),
        });
        if let Some(tf) = &self.timeframe {
            parts.push(format!("周期 {}", tf));
        }
        if let Some(user) = &self.user_id {
            parts.push(format!("用户 {}", user));
        }
        parts.join(" · ")
    }

    /// 本地过滤，mock 后端用
    pub fn matches(&self, item: &FeedItem) -> bool {
        if self.kind.is_some_and(|k| item.kind() != Some(k)) {
            return false;
        }
        if let Some(tf) = &self.timeframe {
            if item.timeframe() != Some(tf.as_str()) {
                return false;
            }
        }
        if let Some(user) = &self.user_id {
            if item.user.user_id.as_deref() != Some(user.as_str()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeedUser {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    #[serde(default, alias = "id", deserialize_with = "lenient::opt_string")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub verified: bool,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub followers: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeedBacktest {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub timeframe: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub assets: Vec<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub period: Option<String>,
    #[serde(default, alias = "initialCapital", deserialize_with = "lenient::opt")]
    pub initial_capital: Option<f64>,
    #[serde(default, alias = "finalCapital", deserialize_with = "lenient::opt")]
    pub final_capital: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    #[default]
    Active,
    Paused,
    Draft,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Active => "active",
            SignalStatus::Paused => "paused",
            SignalStatus::Draft => "draft",
        }
    }

    /// 暂停 <-> 启用；草稿启用
    pub fn toggled(&self) -> SignalStatus {
        match self {
            SignalStatus::Active => SignalStatus::Paused,
            SignalStatus::Paused | SignalStatus::Draft => SignalStatus::Active,
        }
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 交易信号。动态流里的 signal 块与 "我的信号" 列表共用
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    #[serde(default, alias = "signal_id", deserialize_with = "lenient::opt_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub status: Option<SignalStatus>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub timeframe: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub assets: Vec<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub entry: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub target: Option<String>,
    #[serde(default, alias = "stopLoss", deserialize_with = "lenient::opt_string")]
    pub stop_loss: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub confidence: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub followers: Option<u64>,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub performance: Option<PerformanceMetrics>,
    #[serde(default, alias = "createdAt", deserialize_with = "lenient::opt_string")]
    pub created_at: Option<String>,
    #[serde(default, alias = "updatedAt", deserialize_with = "lenient::opt_string")]
    pub updated_at: Option<String>,
}

impl Signal {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("N/A")
    }

    pub fn status_or_default(&self) -> SignalStatus {
        self.status.unwrap_or_default()
    }
}

/// 社区动态条目：signal 或 backtest 二选一，附带作者、绩效和曲线
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeedItem {
    #[serde(deserialize_with = "lenient::id_as_string")]
    pub id: String,
    #[serde(default, rename = "type", deserialize_with = "lenient::opt")]
    pub kind: Option<FeedKind>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub user: FeedUser,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub signal: Option<Signal>,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub backtest: Option<FeedBacktest>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub performance: PerformanceMetrics,
    #[serde(default, alias = "chartData", deserialize_with = "lenient::or_default")]
    pub chart_data: ChartData,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub likes: Option<u64>,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub comments: Option<u64>,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub shares: Option<u64>,
}

impl FeedItem {
    /// 缺少 type 字段时按携带的数据块推断
    pub fn kind(&self) -> Option<FeedKind> {
        self.kind.or(match (&self.signal, &self.backtest) {
            (Some(_), _) => Some(FeedKind::Signal),
            (None, Some(_)) => Some(FeedKind::Backtest),
            (None, None) => None,
        })
    }

    pub fn title(&self) -> &str {
        self.signal
            .as_ref()
            .and_then(|s| s.name.as_deref())
            .or_else(|| self.backtest.as_ref().and_then(|b| b.name.as_deref()))
            .unwrap_or("N/A")
    }

    pub fn timeframe(&self) -> Option<&str> {
        self.signal
            .as_ref()
            .and_then(|s| s.timeframe.as_deref())
            .or_else(|| self.backtest.as_ref().and_then(|b| b.timeframe.as_deref()))
    }

    pub fn assets(&self) -> &[String] {
        match (&self.signal, &self.backtest) {
            (Some(s), _) if !s.assets.is_empty() => &s.assets,
            (_, Some(b)) => &b.assets,
            _ => &[],
        }
    }

    /// 转成结果视图可直接渲染的 BacktestResult
    pub fn to_result(&self) -> BacktestResult {
        let bt = self.backtest.clone().unwrap_or_default();
        let description = self
            .signal
            .as_ref()
            .and_then(|s| s.description.clone())
            .or(bt.description);
        let final_capital = bt.final_capital.or_else(|| {
            match (bt.initial_capital, self.performance.avg_return) {
                (Some(init), Some(ret)) => Some(init * (1.0 + ret / 100.0)),
                _ => None,
            }
        });
        BacktestResult {
            id: format!("feed-{}", self.id),
            name: Some(self.title().to_string()),
            description,
            timeframe: self.timeframe().map(String::from),
            assets: self.assets().to_vec(),
            period: bt.period,
            initial_capital: bt.initial_capital,
            final_capital,
            performance: self.performance.clone(),
            chart_data: self.chart_data.clone(),
            created_at: self.timestamp.clone(),
        }
    }
}

/// 动态流分页响应，camelCase / snake_case 分页字段都接受
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeedPage {
    #[serde(default, deserialize_with = "lenient::valid_items")]
    pub items: Vec<FeedItem>,
    #[serde(default, alias = "totalItems", deserialize_with = "lenient::opt")]
    pub total_items: Option<usize>,
    #[serde(default, alias = "currentPage", deserialize_with = "lenient::opt")]
    pub current_page: Option<usize>,
    #[serde(default, alias = "totalPages", deserialize_with = "lenient::opt")]
    pub total_pages: Option<usize>,
    #[serde(default, alias = "hasNextPage", deserialize_with = "lenient::opt")]
    pub has_next_page: Option<bool>,
    #[serde(default, alias = "pageSize", deserialize_with = "lenient::opt")]
    pub page_size: Option<usize>,
}

impl FeedPage {
    /// 后端未给 has_next_page 时按页码推算
    pub fn has_next(&self) -> bool {
        match (self.has_next_page, self.current_page, self.total_pages) {
            (Some(flag), _, _) => flag,
            (None, Some(cur), Some(total)) => cur < total,
            _ => false,
        }
    }
}

/// 新建信号的请求体
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SignalDraft {
    pub user_id: String,
    pub name: String,
    pub description: String,
    pub timeframe: String,
    pub assets: Vec<String>,
    pub status: SignalStatus,
}

impl SignalDraft {
    /// 接口没有返回可解析的信号时，用草稿本身兜底展示
    pub fn to_signal(&self) -> Signal {
        Signal {
            name: Some(self.name.clone()),
            description: Some(self.description.clone()),
            status: Some(self.status),
            timeframe: Some(self.timeframe.clone()),
            assets: self.assets.clone(),
            ..Signal::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SignalUpdate {
    pub status: SignalStatus,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn feed_item(id: &str, kind: FeedKind, timeframe: &str) -> FeedItem {
        let mut item = FeedItem {
            id: id.to_string(),
            kind: Some(kind),
            ..FeedItem::default()
        };
        match kind {
            FeedKind::Signal => {
                item.signal = Some(Signal {
                    name: Some(format!("signal {}", id)),
                    timeframe: Some(timeframe.to_string()),
                    assets: vec!["BTC/USD".into()],
                    ..Signal::default()
                })
            }
            FeedKind::Backtest => {
                item.backtest = Some(FeedBacktest {
                    name: Some(format!("backtest {}", id)),
                    timeframe: Some(timeframe.to_string()),
                    assets: vec!["ETH/USD".into()],
                    initial_capital: Some(10_000.0),
                    ..FeedBacktest::default()
                })
            }
        }
        item
    }

    #[test]
    fn decodes_camel_case_feed_page() {
        let page: FeedPage = serde_json::from_str(
            r#"{
                "items": [
                    {"id": 1, "type": "signal",
                     "user": {"name": "QuantMaster", "verified": true, "followers": 120},
                     "signal": {"name": "BTC Momentum", "timeframe": "4h", "assets": ["BTC/USD"],
                                "stopLoss": "$900.00", "confidence": 82},
                     "performance": {"winRate": 0.61, "totalTrades": 40},
                     "chartData": {"labels": [0, 1], "datasets": [{"label": "x", "data": [1, 2]}]},
                     "likes": 5},
                    {"id": null},
                    {"id": "b7", "backtest": {"name": "Grid", "timeframe": "1d", "initialCapital": 20000},
                     "performance": {"avgReturn": 10.0}, "user": null}
                ],
                "totalItems": 41, "currentPage": 1, "totalPages": 5, "hasNextPage": true, "pageSize": 10
            }"#,
        )
        .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total_items, Some(41));
        assert!(page.has_next());

        let sig = &page.items[0];
        assert_eq!(sig.id, "1");
        assert_eq!(sig.kind(), Some(FeedKind::Signal));
        assert_eq!(sig.title(), "BTC Momentum");
        assert_eq!(sig.signal.as_ref().unwrap().stop_loss.as_deref(), Some("$900.00"));
        assert_eq!(sig.chart_data.labels, vec!["0".to_string(), "1".to_string()]);
        assert!(sig.user.verified);

        let bt = &page.items[1];
        assert_eq!(bt.kind(), Some(FeedKind::Backtest));
        assert_eq!(bt.timeframe(), Some("1d"));
        assert_eq!(bt.user, FeedUser::default());
        let result = bt.to_result();
        assert_eq!(result.id, "feed-b7");
        assert_eq!(result.final_capital, Some(22_000.0));
        assert!((result.total_return_pct().unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn has_next_falls_back_to_page_numbers() {
        let page: FeedPage =
            serde_json::from_str(r#"{"items": [], "current_page": 2, "total_pages": 3}"#).unwrap();
        assert!(page.has_next());
        let last: FeedPage = serde_json::from_str(r#"{"current_page": 3, "total_pages": 3}"#).unwrap();
        assert!(!last.has_next());
        assert!(!FeedPage::default().has_next());
    }

    #[test]
    fn query_params_and_paging() {
        let q = FeedQuery {
            kind: Some(FeedKind::Backtest),
            timeframe: Some("1h".into()),
            ..FeedQuery::default()
        };
        assert_eq!(
            q.params(),
            vec![
                ("page", "1".to_string()),
                ("limit", "10".to_string()),
                ("type", "backtest".to_string()),
                ("timeframe", "1h".to_string()),
            ]
        );
        assert_eq!(q.prev_page().page, 1);
        assert_eq!(q.next_page().next_page().page, 3);
        assert!(q.clone().with_limit(20).is_ok());
        assert!(q.with_limit(15).is_err());
    }

    #[test]
    fn query_filters_items_locally() {
        let sig = feed_item("1", FeedKind::Signal, "4h");
        let bt = feed_item("2", FeedKind::Backtest, "1d");
        let only_bt = FeedQuery {
            kind: Some(FeedKind::Backtest),
            ..FeedQuery::default()
        };
        assert!(!only_bt.matches(&sig));
        assert!(only_bt.matches(&bt));

        let four_hour = FeedQuery {
            timeframe: Some("4h".into()),
            ..FeedQuery::default()
        };
        assert!(four_hour.matches(&sig));
        assert!(!four_hour.matches(&bt));
    }

    #[test]
    fn signal_accepts_numeric_id_and_unknown_status() {
        let s: Signal = serde_json::from_str(
            r#"{"signal_id": 12, "name": "ETH Range", "status": "archived", "assets": "ETH/USD"}"#,
        )
        .unwrap();
        assert_eq!(s.id.as_deref(), Some("12"));
        assert_eq!(s.status, None);
        assert_eq!(s.status_or_default(), SignalStatus::Active);
        assert_eq!(s.assets, vec!["ETH/USD".to_string()]);
        assert_eq!(SignalStatus::Active.toggled(), SignalStatus::Paused);
        assert_eq!(SignalStatus::Draft.toggled(), SignalStatus::Active);
    }
}
