use crate::jobs::model::JobRecord;
use log::info;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

pub const ACTIVE_POLL_INTERVAL: Duration = Duration::from_millis(5000);
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(20000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    /// 没有 pending / running 任务
    Idle,
    /// 至少一个 pending / running 任务
    Active,
}

impl PollMode {
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a JobRecord>) -> Self {
        if jobs.into_iter().any(|j| j.status.is_active()) {
            PollMode::Active
        } else {
            PollMode::Idle
        }
    }

    pub fn interval(&self) -> Duration {
        match self {
            PollMode::Idle => IDLE_POLL_INTERVAL,
            PollMode::Active => ACTIVE_POLL_INTERVAL,
        }
    }
}

/// 轮询调度器：任意时刻最多只有一个定时器在运行。
///
/// 定时器是一个后台 ticker 任务，按周期把 `tick` 消息投递回所属 actor；
/// 重新布置或 disarm 时先 abort 旧任务。Drop 时同样清理，避免视图销毁后继续拉取。
pub struct PollScheduler<M: Clone + Send + 'static> {
    tx: mpsc::UnboundedSender<M>,
    tick: M,
    handle: Option<JoinHandle<()>>,
    mode: Option<PollMode>,
}

impl<M: Clone + Send + 'static> PollScheduler<M> {
    pub fn new(tx: mpsc::UnboundedSender<M>, tick: M) -> Self {
        Self {
            tx,
            tick,
            handle: None,
            mode: None,
        }
    }

    /// 根据当前任务列表重新计算模式并重新布置定时器
    pub fn rearm<'a>(&mut self, jobs: impl IntoIterator<Item = &'a JobRecord>) -> PollMode {
        let mode = PollMode::from_jobs(jobs);
        self.arm(mode);
        mode
    }

    /// 只在模式变化（或尚未布置）时重新布置，不打断当前节奏
    pub fn rearm_if_changed<'a>(
        &mut self,
        jobs: impl IntoIterator<Item = &'a JobRecord>,
    ) -> Option<PollMode> {
        let mode = PollMode::from_jobs(jobs);
        if self.is_armed() && self.mode == Some(mode) {
            return None;
        }
        self.arm(mode);
        Some(mode)
    }

    pub fn arm(&mut self, mode: PollMode) {
        self.disarm();

        let period = mode.interval();
        if self.mode != Some(mode) {
            info!("轮询模式切换为 {:?}，间隔 {} ms", mode, period.as_millis());
        }
        let tx = self.tx.clone();
        let tick = self.tick.clone();
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(tick.clone()).is_err() {
                    // actor 已退出
                    break;
                }
            }
        }));
        self.mode = Some(mode);
    }

    pub fn disarm(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    /// 最近一次布置的模式（disarm 后保留，仅用于展示）
    pub fn mode(&self) -> Option<PollMode> {
        self.mode
    }
}

impl<M: Clone + Send + 'static> Drop for PollScheduler<M> {
    fn drop(&mut self) {
        self.disarm();
    }
}
