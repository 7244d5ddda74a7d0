use crate::jobs::projection::{SortKey, SortOrder, StatusFilter};
use crate::signals::{FeedKind, FeedQuery, SignalStatus};
use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;

pub const TIMEFRAMES: [&str; 6] = ["1m", "5m", "15m", "1h", "4h", "1d"];

pub const HELP_TEXT: &str = "可用命令: refresh | cancel <job_id> | watch <job_id> | watch stop | submit <name> <timeframe> <ASSET,...> [period] [capital] | result <backtest_id> | feed [page] [limit] [all|signal|backtest] [timeframe] [@user] | signals | signal create <name> <timeframe> <ASSET,...> [description] | signal pause|resume|delete <id> | backtests | filter <all|pending|running|completed|failed|cancelled> | sort <field> [asc|desc] | login <user_id> <token> [name] | logout | stats | metrics | health | dismiss | quit";

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitArgs {
    pub name: String,
    pub timeframe: String,
    pub assets: Vec<String>,
    pub period: Option<String>,
    pub capital: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalArgs {
    pub name: String,
    pub timeframe: String,
    pub assets: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Refresh,
    Cancel {
        job_id: String,
    },
    Watch {
        job_id: String,
    },
    WatchStop,
    Submit(SubmitArgs),
    ShowResult {
        backtest_id: String,
    },
    Feed(FeedQuery),
    Signals,
    Backtests,
    CreateSignal(SignalArgs),
    DeleteSignal {
        signal_id: String,
    },
    SetSignalStatus {
        signal_id: String,
        status: SignalStatus,
    },
    Filter(StatusFilter),
    Sort {
        key: SortKey,
        order: Option<SortOrder>,
    },
    Login {
        user_id: String,
        token: String,
        name: Option<String>,
    },
    Logout,
    Stats,
    Metrics,
    Health,
    DismissToast,
    Help,
    Quit,
    Unknown(String),
}

impl AppCommand {
    /// 只影响本地视图、不需要发给后台 actor 的命令
    pub fn is_view_local(&self) -> bool {
        matches!(
            self,
            AppCommand::Filter(_) | AppCommand::Sort { .. } | AppCommand::Stats | AppCommand::Quit
        )
    }
}

fn asset_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Z0-9]{1,10}(/[A-Z0-9]{1,10})?$").ok())
        .as_ref()
}

/// 解析逗号分隔的资产列表，统一转大写
pub fn parse_assets(raw: &str) -> Result<Vec<String>, String> {
    let pattern = asset_pattern().ok_or_else(|| "资产校验规则不可用".to_string())?;
    let mut assets = Vec::new();
    for tok in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let sym = tok.to_ascii_uppercase();
        if !pattern.is_match(&sym) {
            return Err(format!("无效的资产代码: {}", tok));
        }
        if !assets.contains(&sym) {
            assets.push(sym);
        }
    }
    if assets.is_empty() {
        return Err("至少需要一个资产".to_string());
    }
    Ok(assets)
}

fn parse_timeframe(raw: &str) -> Result<String, String> {
    let timeframe = raw.to_ascii_lowercase();
    if TIMEFRAMES.contains(&timeframe.as_str()) {
        Ok(timeframe)
    } else {
        Err(format!(
            "无效的周期: {}，可选 {}",
            timeframe,
            TIMEFRAMES.join("/")
        ))
    }
}

/// feed 参数不分先后：第一个数字是页码，第二个是每页条数，其余按类型 / 周期 / @用户 识别
fn parse_feed(args: &[&str]) -> Result<FeedQuery, String> {
    let mut query = FeedQuery::default();
    let mut numbers = 0;
    for arg in args {
        if let Ok(n) = arg.parse::<usize>() {
            numbers += 1;
            match numbers {
                1 if n >= 1 => query.page = n,
                1 => return Err("页码从 1 开始".to_string()),
                2 => query = query.with_limit(n)?,
                _ => return Err(format!("多余的数字参数: {}", arg)),
            }
        } else if let Some(user) = arg.strip_prefix('@') {
            if user.is_empty() {
                return Err("用法: @<user_id>".to_string());
            }
            query.user_id = Some(user.to_string());
        } else if arg.eq_ignore_ascii_case("all") {
            query.kind = None;
        } else if let Ok(kind) = arg.parse::<FeedKind>() {
            query.kind = Some(kind);
        } else {
            query.timeframe = Some(parse_timeframe(arg)?);
        }
    }
    Ok(query)
}

fn parse_signal(args: &[&str]) -> AppCommand {
    const USAGE: &str =
        "用法: signal create <name> <timeframe> <ASSET,...> [description] | signal pause|resume|delete <id>";
    match args {
        ["create", name, tf, assets, rest @ ..] => {
            let parsed = parse_timeframe(tf).and_then(|tf| parse_assets(assets).map(|a| (tf, a)));
            match parsed {
                Ok((timeframe, assets)) => AppCommand::CreateSignal(SignalArgs {
                    name: name.replace('_', " "),
                    timeframe,
                    assets,
                    description: if rest.is_empty() {
                        None
                    } else {
                        Some(rest.join(" "))
                    },
                }),
                Err(msg) => AppCommand::Unknown(msg),
            }
        }
        ["delete" | "rm", id] => AppCommand::DeleteSignal {
            signal_id: id.to_string(),
        },
        ["pause", id] => AppCommand::SetSignalStatus {
            signal_id: id.to_string(),
            status: SignalStatus::Paused,
        },
        ["resume" | "activate", id] => AppCommand::SetSignalStatus {
            signal_id: id.to_string(),
            status: SignalStatus::Active,
        },
        _ => AppCommand::Unknown(USAGE.to_string()),
    }
}

fn parse_submit(args: &[&str]) -> Result<SubmitArgs, String> {
    const USAGE: &str = "用法: submit <name> <timeframe> <ASSET,...> [period] [capital]";
    let (name, timeframe, assets) = match args {
        [name, tf, assets, ..] => (*name, *tf, *assets),
        _ => return Err(USAGE.to_string()),
    };

    let timeframe = parse_timeframe(timeframe)?;
    let assets = parse_assets(assets)?;

    let mut rest: Vec<&str> = args[3..].to_vec();
    let mut capital = None;
    if let Some(last) = rest.last() {
        if let Ok(v) = last.replace('_', "").parse::<f64>() {
            if !v.is_finite() || v <= 0.0 {
                return Err(format!("初始资金必须为正数: {}", last));
            }
            capital = Some(v);
            rest.pop();
        }
    }
    let period = if rest.is_empty() {
        None
    } else {
        Some(rest.join(" "))
    };

    Ok(SubmitArgs {
        name: name.replace('_', " "),
        timeframe,
        assets,
        period,
        capital,
    })
}

impl FromStr for AppCommand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.is_empty() {
            return Ok(AppCommand::Unknown("".to_string()));
        }

        let cmd = match parts[0] {
            "refresh" | "r" | "retry" => AppCommand::Refresh,
            "cancel" => match parts.get(1) {
                Some(id) => AppCommand::Cancel {
                    job_id: id.to_string(),
                },
                None => AppCommand::Unknown("用法: cancel <job_id>".to_string()),
            },
            "watch" => match parts.get(1).copied() {
                Some("stop") => AppCommand::WatchStop,
                Some(id) => AppCommand::Watch {
                    job_id: id.to_string(),
                },
                None => AppCommand::Unknown("用法: watch <job_id> | watch stop".to_string()),
            },
            "submit" => match parse_submit(&parts[1..]) {
                Ok(args) => AppCommand::Submit(args),
                Err(msg) => AppCommand::Unknown(msg),
            },
            "result" | "results" => match parts.get(1) {
                Some(id) => AppCommand::ShowResult {
                    backtest_id: id.to_string(),
                },
                None => AppCommand::Unknown("用法: result <backtest_id>".to_string()),
            },
            "feed" => match parse_feed(&parts[1..]) {
                Ok(query) => AppCommand::Feed(query),
                Err(msg) => AppCommand::Unknown(msg),
            },
            "signals" => AppCommand::Signals,
            "signal" => parse_signal(&parts[1..]),
            "backtests" => AppCommand::Backtests,
            "filter" => match parts.get(1).map(|s| s.parse::<StatusFilter>()) {
                None => AppCommand::Filter(StatusFilter::All),
                Some(Ok(f)) => AppCommand::Filter(f),
                Some(Err(e)) => AppCommand::Unknown(e),
            },
            "sort" => match parts.get(1).map(|s| s.parse::<SortKey>()) {
                Some(Ok(key)) => match parts.get(2).map(|s| s.parse::<SortOrder>()) {
                    None => AppCommand::Sort { key, order: None },
                    Some(Ok(order)) => AppCommand::Sort {
                        key,
                        order: Some(order),
                    },
                    Some(Err(e)) => AppCommand::Unknown(e),
                },
                Some(Err(e)) => AppCommand::Unknown(e),
                None => AppCommand::Unknown(
                    "用法: sort <created|started|completed|name|status|progress> [asc|desc]"
                        .to_string(),
                ),
            },
            "login" => match (parts.get(1), parts.get(2)) {
                (Some(user_id), Some(token)) => AppCommand::Login {
                    user_id: user_id.to_string(),
                    token: token.to_string(),
                    name: if parts.len() > 3 {
                        Some(parts[3..].join(" "))
                    } else {
                        None
                    },
                },
                _ => AppCommand::Unknown("用法: login <user_id> <token> [name]".to_string()),
            },
            "logout" => AppCommand::Logout,
            "stats" => AppCommand::Stats,
            "metrics" => AppCommand::Metrics,
            "health" => AppCommand::Health,
            "dismiss" => AppCommand::DismissToast,
            "help" | "h" => AppCommand::Help,
            "quit" | "q" | "exit" => AppCommand::Quit,
            other => AppCommand::Unknown(format!("未知命令: {}", other)),
        };
        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::model::JobStatus;

    fn parse(s: &str) -> AppCommand {
        AppCommand::from_str(s).unwrap()
    }

    #[test]
    fn parses_job_commands() {
        assert_eq!(parse("r"), AppCommand::Refresh);
        assert_eq!(
            parse("cancel job_42"),
            AppCommand::Cancel {
                job_id: "job_42".into()
            }
        );
        assert_eq!(parse("watch stop"), AppCommand::WatchStop);
        assert_eq!(
            parse("watch job_1"),
            AppCommand::Watch {
                job_id: "job_1".into()
            }
        );
        assert!(matches!(parse("cancel"), AppCommand::Unknown(_)));
    }

    #[test]
    fn parses_submit_with_optional_period_and_capital() {
        let cmd = parse("submit RSI_Reversal 1H btc/usdt,ETH 3 months 25000");
        assert_eq!(
            cmd,
            AppCommand::Submit(SubmitArgs {
                name: "RSI Reversal".into(),
                timeframe: "1h".into(),
                assets: vec!["BTC/USDT".into(), "ETH".into()],
                period: Some("3 months".into()),
                capital: Some(25000.0),
            })
        );

        let cmd = parse("submit Quick 1d AAPL");
        match cmd {
            AppCommand::Submit(args) => {
                assert!(args.period.is_none());
                assert!(args.capital.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn submit_validation_errors() {
        assert!(matches!(parse("submit X 2h BTC"), AppCommand::Unknown(m) if m.contains("周期")));
        assert!(matches!(parse("submit X 1h BTC-USD"), AppCommand::Unknown(m) if m.contains("资产")));
        assert!(matches!(parse("submit X 1h BTC -5"), AppCommand::Unknown(_)));
        assert!(matches!(parse("submit X"), AppCommand::Unknown(_)));
    }

    #[test]
    fn parses_assets() {
        assert_eq!(
            parse_assets("btc, eth ,BTC"),
            Ok(vec!["BTC".to_string(), "ETH".to_string()])
        );
        assert!(parse_assets("ABCDEFGHIJK").is_err());
        assert!(parse_assets(" , ").is_err());
    }

    #[test]
    fn parses_view_commands() {
        assert_eq!(
            parse("filter running"),
            AppCommand::Filter(StatusFilter::Only(JobStatus::Running))
        );
        assert_eq!(parse("filter"), AppCommand::Filter(StatusFilter::All));
        assert_eq!(
            parse("sort name asc"),
            AppCommand::Sort {
                key: SortKey::StrategyName,
                order: Some(SortOrder::Asc)
            }
        );
        assert!(parse("sort progress").is_view_local());
        assert!(!parse("refresh").is_view_local());
        assert!(matches!(parse("sort size"), AppCommand::Unknown(_)));
    }

    #[test]
    fn parses_feed_queries() {
        assert_eq!(parse("feed"), AppCommand::Feed(FeedQuery::default()));
        assert_eq!(
            parse("feed 3 20 backtest 4H @user_007"),
            AppCommand::Feed(FeedQuery {
                page: 3,
                limit: 20,
                kind: Some(FeedKind::Backtest),
                timeframe: Some("4h".into()),
                user_id: Some("user_007".into()),
            })
        );
        assert_eq!(
            parse("feed signal"),
            AppCommand::Feed(FeedQuery {
                kind: Some(FeedKind::Signal),
                ..FeedQuery::default()
            })
        );
        assert!(matches!(parse("feed 1 15"), AppCommand::Unknown(m) if m.contains("每页")));
        assert!(matches!(parse("feed 0"), AppCommand::Unknown(_)));
        assert!(matches!(parse("feed weekly"), AppCommand::Unknown(m) if m.contains("周期")));
    }

    #[test]
    fn parses_signal_commands() {
        assert_eq!(parse("signals"), AppCommand::Signals);
        assert_eq!(parse("backtests"), AppCommand::Backtests);
        assert_eq!(
            parse("signal create DOT_Swing 4h dot/usd swing the range"),
            AppCommand::CreateSignal(SignalArgs {
                name: "DOT Swing".into(),
                timeframe: "4h".into(),
                assets: vec!["DOT/USD".into()],
                description: Some("swing the range".into()),
            })
        );
        assert_eq!(
            parse("signal pause sig_1"),
            AppCommand::SetSignalStatus {
                signal_id: "sig_1".into(),
                status: SignalStatus::Paused
            }
        );
        assert_eq!(
            parse("signal delete sig_1"),
            AppCommand::DeleteSignal {
                signal_id: "sig_1".into()
            }
        );
        assert!(matches!(parse("signal create X 2h BTC"), AppCommand::Unknown(m) if m.contains("周期")));
        assert!(matches!(parse("signal"), AppCommand::Unknown(_)));
        assert!(!parse("signals").is_view_local());
    }

    #[test]
    fn parses_session_commands() {
        assert_eq!(
            parse("login u1 tok Ada Lovelace"),
            AppCommand::Login {
                user_id: "u1".into(),
                token: "tok".into(),
                name: Some("Ada Lovelace".into())
            }
        );
        assert!(matches!(parse("login u1"), AppCommand::Unknown(_)));
        assert_eq!(parse("logout"), AppCommand::Logout);
        assert!(matches!(parse("frobnicate"), AppCommand::Unknown(m) if m.contains("frobnicate")));
    }
}
