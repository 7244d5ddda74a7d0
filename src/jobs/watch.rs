use crate::api::JobsApi;
use crate::app_state::AppEvent;
use crate::jobs::poller::PollerLink;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

pub const WATCH_INTERVAL: Duration = Duration::from_millis(3000);

/// 单任务跟踪：每 3 秒查询一次，直到任务进入终态。
///
/// 查询出错只上报，不中断；由调用方 abort 停止。
pub fn spawn_watcher(
    api: Arc<dyn JobsApi>,
    job_id: String,
    events: mpsc::UnboundedSender<AppEvent>,
    link: Option<PollerLink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("开始跟踪任务 {}", job_id);
        let mut ticker = interval(WATCH_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match api.get_job(&job_id).await {
                Ok(job) => {
                    let terminal = job.status.is_terminal();
                    let status = job.status;
                    if let Some(link) = &link {
                        link.merge(job.clone());
                    }
                    let _ = events.send(AppEvent::Watched(job));
                    if terminal {
                        info!("任务 {} 已结束: {}", job_id, status);
                        let _ = events.send(AppEvent::Message(format!(
                            "✓ 任务 {} 已结束: {}",
                            job_id, status
                        )));
                        break;
                    }
                }
                Err(e) => {
                    warn!("查询任务 {} 失败: {}", job_id, e);
                    let _ = events.send(AppEvent::Error(format!(
                        "✗ 查询任务 {} 失败: {}",
                        job_id, e
                    )));
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::jobs::model::tests::job;
    use crate::jobs::model::{
        BacktestResult, CreateJobRequest, CreateJobResponse, JobListResponse, JobRecord,
        JobStatus,
    };
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    struct ScriptedJob {
        script: Mutex<VecDeque<Result<JobRecord, ApiError>>>,
        calls: Mutex<Vec<Instant>>,
    }

    #[async_trait]
    impl JobsApi for ScriptedJob {
        async fn list_user_jobs(&self, _user_id: &str) -> Result<JobListResponse, ApiError> {
            Ok(JobListResponse::default())
        }

        async fn get_job(&self, job_id: &str) -> Result<JobRecord, ApiError> {
            self.calls.lock().unwrap().push(Instant::now());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::NotFound(job_id.to_string())))
        }

        async fn cancel_job(&self, _job_id: &str) -> Result<(), ApiError> {
            Ok(())
        }

        async fn create_job(&self, _req: &CreateJobRequest) -> Result<CreateJobResponse, ApiError> {
            Err(ApiError::Http("unsupported".into()))
        }

        async fn get_backtest(&self, id: &str) -> Result<BacktestResult, ApiError> {
            Err(ApiError::NotFound(id.to_string()))
        }

        async fn health(&self) -> Result<String, ApiError> {
            Ok("ok".into())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polls_every_three_seconds_until_terminal() {
        let api = Arc::new(ScriptedJob {
            script: Mutex::new(VecDeque::from(vec![
                Ok(job("j", JobStatus::Pending)),
                Err(ApiError::Http("reset".into())),
                Ok(job("j", JobStatus::Running)),
                Ok(job("j", JobStatus::Completed)),
            ])),
            calls: Mutex::new(Vec::new()),
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dyn_api: Arc<dyn JobsApi> = api.clone();
        let handle = spawn_watcher(dyn_api, "j".into(), tx, None);
        handle.await.unwrap();

        let calls = api.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 4);
        for pair in calls.windows(2) {
            assert_eq!(pair[1] - pair[0], WATCH_INTERVAL);
        }

        let mut watched = Vec::new();
        let mut errors = 0;
        while let Ok(evt) = rx.try_recv() {
            match evt {
                AppEvent::Watched(j) => watched.push(j.status),
                AppEvent::Error(_) => errors += 1,
                _ => {}
            }
        }
        assert_eq!(
            watched,
            vec![JobStatus::Pending, JobStatus::Running, JobStatus::Completed]
        );
        assert_eq!(errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_stops_watching() {
        let api = Arc::new(ScriptedJob {
            script: Mutex::new(VecDeque::from(vec![Ok(job("j", JobStatus::Running)); 10])),
            calls: Mutex::new(Vec::new()),
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        let dyn_api: Arc<dyn JobsApi> = api.clone();
        let handle = spawn_watcher(dyn_api, "j".into(), tx, None);

        tokio::time::sleep(Duration::from_millis(3500)).await;
        handle.abort();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(api.calls.lock().unwrap().len(), 2);
    }
}
