//! 进程内投递队列
//!
//! 同一时刻只有一个处理循环在运行：`processing` 标志位通过 CAS 抢占，
//! 抢占失败的触发直接返回。处理循环从队头取任务，未到重试时间的任务移到队尾；
//! 当剩余任务全部处于等待状态时循环提前退出，由定时 tick 或新任务再次触发。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use config::DeliveryConfig;
use domain::{DeliveryJob, JobId, JobState, NotificationPayload};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::dispatcher::{NotificationQueue, QueueError};
use super::retry::RetryPolicy;
use super::transport::{MailTransport, MessageRenderer};
use crate::clock::Clock;

/// 队列配置
#[derive(Debug, Clone)]
pub struct DeliveryQueueConfig {
    pub retry: RetryPolicy,
    /// 定时重新触发处理循环的间隔
    pub tick_interval: Duration,
    /// 关闭时等待处理循环自然结束的上限
    pub shutdown_grace: Duration,
    pub outcome_channel_capacity: usize,
}

impl Default for DeliveryQueueConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            tick_interval: Duration::from_secs(2),
            shutdown_grace: Duration::from_secs(10),
            outcome_channel_capacity: 256,
        }
    }
}

impl From<&DeliveryConfig> for DeliveryQueueConfig {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            retry: RetryPolicy::from(config),
            tick_interval: config.tick_interval(),
            shutdown_grace: config.shutdown_grace(),
            outcome_channel_capacity: config.outcome_channel_capacity.max(1),
        }
    }
}

/// 单次投递尝试的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered {
        job_id: JobId,
        recipient: String,
        attempts: u32,
    },
    Retrying {
        job_id: JobId,
        attempts: u32,
        retry_in: Duration,
        error: String,
    },
    PermanentlyFailed {
        job_id: JobId,
        recipient: String,
        template_key: String,
        attempts: u32,
        last_error: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// 队列中的任务数，包括正在发送的任务
    pub depth: usize,
    pub processing: bool,
    pub accepting: bool,
    pub delivered: u64,
    pub retried: u64,
    pub permanently_failed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub remaining_jobs: usize,
    pub drained_within_grace: bool,
}

struct Shared {
    jobs: Mutex<VecDeque<DeliveryJob>>,
    processing: AtomicBool,
    in_flight: AtomicBool,
    accepting: AtomicBool,
    halted: AtomicBool,
    idle: Notify,
    transport: Arc<dyn MailTransport>,
    renderer: Arc<dyn MessageRenderer>,
    clock: Arc<dyn Clock>,
    config: DeliveryQueueConfig,
    outcomes: broadcast::Sender<DeliveryOutcome>,
    delivered: AtomicU64,
    retried: AtomicU64,
    permanently_failed: AtomicU64,
}

impl Shared {
    /// 空闲时启动处理循环；已有循环在运行时什么都不做
    fn trigger(shared: &Arc<Shared>) {
        if shared.halted.load(Ordering::Acquire) {
            return;
        }
        if shared
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let shared = Arc::clone(shared);
        tokio::spawn(async move {
            shared.drain().await;
        });
    }

    async fn drain(self: Arc<Self>) {
        loop {
            self.run_pass().await;

            self.processing.store(false, Ordering::Release);
            self.idle.notify_waiters();

            // 循环退出与标志位清除之间入队的任务不会触发新循环，这里补一次
            if self.halted.load(Ordering::Acquire) || !self.has_ready_job().await {
                break;
            }
            if self
                .processing
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                break;
            }
        }
    }

    async fn has_ready_job(&self) -> bool {
        let now = Instant::now();
        self.jobs.lock().await.iter().any(|job| job.is_ready(now))
    }

    async fn run_pass(&self) {
        let mut consecutive_waiting = 0usize;

        loop {
            if self.halted.load(Ordering::Acquire) {
                break;
            }

            let job = {
                let mut jobs = self.jobs.lock().await;
                if consecutive_waiting >= jobs.len() {
                    break;
                }
                let Some(job) = jobs.pop_front() else {
                    break;
                };
                if !job.is_ready(Instant::now()) {
                    jobs.push_back(job);
                    consecutive_waiting += 1;
                    continue;
                }
                self.in_flight.store(true, Ordering::Release);
                job
            };

            consecutive_waiting = 0;
            self.attempt(job).await;
            self.in_flight.store(false, Ordering::Release);
        }
    }

    async fn attempt(&self, mut job: DeliveryJob) {
        let payload = job.payload();
        let message = self
            .renderer
            .render(&payload.template_key, &payload.template_data);
        let result = self
            .transport
            .send(&payload.recipient, &message.subject, &message.body)
            .await;

        match result {
            Ok(()) => {
                if let Err(err) = job.record_success(self.clock.now()) {
                    tracing::error!(job_id = %job.id(), error = %err, "invalid job transition");
                    return;
                }
                self.delivered.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    job_id = %job.id(),
                    recipient = %job.payload().recipient,
                    attempts = job.attempts(),
                    "notification delivered"
                );
                let _ = self.outcomes.send(DeliveryOutcome::Delivered {
                    job_id: job.id(),
                    recipient: job.payload().recipient.clone(),
                    attempts: job.attempts(),
                });
            }
            Err(err) => {
                let retry = &self.config.retry;
                let state = job
                    .record_failure(err.to_string(), Instant::now(), self.clock.now(), |n| {
                        retry.delay_for(n)
                    })
                    .cloned();

                match state {
                    Ok(JobState::Deferred {
                        next_retry_at,
                        last_error,
                    }) => {
                        let retry_in = next_retry_at.saturating_duration_since(Instant::now());
                        self.retried.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            job_id = %job.id(),
                            recipient = %job.payload().recipient,
                            attempts = job.attempts(),
                            retry_in_ms = retry_in.as_millis() as u64,
                            error = %last_error,
                            "notification delivery failed, retry scheduled"
                        );
                        let outcome = DeliveryOutcome::Retrying {
                            job_id: job.id(),
                            attempts: job.attempts(),
                            retry_in,
                            error: last_error,
                        };
                        self.jobs.lock().await.push_back(job);
                        let _ = self.outcomes.send(outcome);
                    }
                    Ok(JobState::PermanentlyFailed { last_error, .. }) => {
                        self.permanently_failed.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(
                            job_id = %job.id(),
                            recipient = %job.payload().recipient,
                            template_key = %job.payload().template_key,
                            attempts = job.attempts(),
                            max_attempts = job.max_attempts(),
                            queued_at = %job.created_at(),
                            error = %last_error,
                            "notification permanently failed, job dropped"
                        );
                        let _ = self.outcomes.send(DeliveryOutcome::PermanentlyFailed {
                            job_id: job.id(),
                            recipient: job.payload().recipient.clone(),
                            template_key: job.payload().template_key.clone(),
                            attempts: job.attempts(),
                            last_error,
                        });
                    }
                    Ok(other) => {
                        tracing::error!(
                            job_id = %job.id(),
                            state = other.name(),
                            "unexpected job state after failed attempt"
                        );
                    }
                    Err(err) => {
                        tracing::error!(job_id = %job.id(), error = %err, "invalid job transition");
                    }
                }
            }
        }
    }

    async fn depth(&self) -> usize {
        let queued = self.jobs.lock().await.len();
        queued + usize::from(self.in_flight.load(Ordering::Acquire))
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.processing.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }
}

/// 带重试的进程内投递队列
///
/// 生命周期：`new` -> `start` -> (`enqueue`...) -> `shutdown`。
/// 队列状态只存在于内存中，进程退出时未投递的任务会丢失。
pub struct DeliveryQueue {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl DeliveryQueue {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        renderer: Arc<dyn MessageRenderer>,
        clock: Arc<dyn Clock>,
        config: DeliveryQueueConfig,
    ) -> Self {
        let (outcomes, _) = broadcast::channel(config.outcome_channel_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                jobs: Mutex::new(VecDeque::new()),
                processing: AtomicBool::new(false),
                in_flight: AtomicBool::new(false),
                accepting: AtomicBool::new(true),
                halted: AtomicBool::new(false),
                idle: Notify::new(),
                transport,
                renderer,
                clock,
                config,
                outcomes,
                delivered: AtomicU64::new(0),
                retried: AtomicU64::new(0),
                permanently_failed: AtomicU64::new(0),
            }),
            cancel: CancellationToken::new(),
            ticker: Mutex::new(None),
        }
    }

    /// 启动定时 tick，重复调用无副作用
    pub async fn start(&self) {
        let mut ticker = self.ticker.lock().await;
        if ticker.is_some() || self.cancel.is_cancelled() {
            return;
        }

        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();
        let period = self.shared.config.tick_interval;

        *ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => Shared::trigger(&shared),
                }
            }

            tracing::debug!("delivery queue ticker stopped");
        }));

        tracing::info!(
            tick_interval_ms = period.as_millis() as u64,
            max_attempts = self.shared.config.retry.max_attempts,
            "delivery queue started"
        );
    }

    /// 追加到队尾，空闲时立即开始处理
    pub async fn enqueue(&self, payload: NotificationPayload) -> Result<JobId, QueueError> {
        if !self.shared.accepting.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }

        let job = DeliveryJob::new(
            payload,
            self.shared.config.retry.max_attempts,
            self.shared.clock.now(),
        );
        let job_id = job.id();
        self.shared.jobs.lock().await.push_back(job);

        Shared::trigger(&self.shared);
        Ok(job_id)
    }

    /// 停止 tick，在宽限期内等待处理循环结束，然后无条件停止
    pub async fn shutdown(&self) -> ShutdownReport {
        self.shared.accepting.store(false, Ordering::Release);
        self.cancel.cancel();

        if let Some(handle) = self.ticker.lock().await.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "delivery queue ticker ended abnormally");
            }
        }

        let grace = self.shared.config.shutdown_grace;
        let drained_within_grace = tokio::time::timeout(grace, self.shared.wait_idle())
            .await
            .is_ok();
        self.shared.halted.store(true, Ordering::Release);

        let remaining_jobs = self.shared.depth().await;
        if remaining_jobs > 0 {
            tracing::warn!(
                remaining_jobs,
                drained_within_grace,
                "delivery queue stopped with undelivered jobs"
            );
        } else {
            tracing::info!(drained_within_grace, "delivery queue stopped");
        }

        ShutdownReport {
            remaining_jobs,
            drained_within_grace,
        }
    }

    pub async fn stats(&self) -> QueueStats {
        QueueStats {
            depth: self.shared.depth().await,
            processing: self.shared.processing.load(Ordering::Acquire),
            accepting: self.shared.accepting.load(Ordering::Acquire),
            delivered: self.shared.delivered.load(Ordering::Relaxed),
            retried: self.shared.retried.load(Ordering::Relaxed),
            permanently_failed: self.shared.permanently_failed.load(Ordering::Relaxed),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryOutcome> {
        self.shared.outcomes.subscribe()
    }
}

impl Drop for DeliveryQueue {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl NotificationQueue for DeliveryQueue {
    async fn enqueue(&self, payload: NotificationPayload) -> Result<JobId, QueueError> {
        DeliveryQueue::enqueue(self, payload).await
    }
}
