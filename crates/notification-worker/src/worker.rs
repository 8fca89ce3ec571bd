//! 分发 worker 池
//!
//! 一个拉取任务从延迟队列拉取到期消息，写入有界缓冲区；N 个 worker 共享缓冲区的接收端并发处理。
//! 缓冲区满时拉取任务阻塞（背压），消息留在队列中。
//!
//! 每条拉取到的消息从进入缓冲区起就持有一个 [`LeaseKeeper`]，直到处理结束才释放，
//! 发送耗时超过租约也不会被重新投递。
//!
//! 关闭流程：收到 shutdown 信号后拉取任务停止拉取，worker 完成手上的消息后退出，
//! 不再从缓冲区取新消息。缓冲区中未处理的消息停止续租，租约到期后由队列重新投递。

use std::sync::Arc;
use std::time::Duration;

use notifier_shared::config::{QueueConfig, WorkerConfig};
use notifier_shared::delay_queue::{DelayQueue, Delivery, LeaseKeeper};
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, error, info};

use crate::handler::DispatchHandler;

/// 缓冲区中的消息连同它的续租任务
type Leased = (Delivery, LeaseKeeper);
type SharedReceiver = Arc<Mutex<mpsc::Receiver<Leased>>>;

pub struct DispatchWorkerPool {
    queue: Arc<dyn DelayQueue>,
    handler: Arc<DispatchHandler>,
    worker_count: usize,
    buffer_size: usize,
    batch_size: usize,
    poll_interval: Duration,
}

impl DispatchWorkerPool {
    pub fn new(
        queue: Arc<dyn DelayQueue>,
        handler: Arc<DispatchHandler>,
        worker_config: &WorkerConfig,
        queue_config: &QueueConfig,
    ) -> Self {
        Self {
            queue,
            handler,
            worker_count: worker_config.worker_count.max(1),
            buffer_size: worker_config.buffer_size(),
            batch_size: queue_config.batch_size.max(1),
            poll_interval: queue_config.poll_interval(),
        }
    }

    /// 运行直到收到 shutdown 信号且所有 worker 退出
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let (tx, rx) = mpsc::channel::<Leased>(self.buffer_size);
        let rx: SharedReceiver = Arc::new(Mutex::new(rx));

        info!(
            worker_count = self.worker_count,
            buffer_size = self.buffer_size,
            "分发 worker 池已启动"
        );

        let intake = tokio::spawn(run_intake(
            self.queue.clone(),
            tx,
            self.batch_size,
            self.poll_interval,
            shutdown.clone(),
        ));

        let workers: Vec<_> = (0..self.worker_count)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    rx.clone(),
                    self.handler.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();

        if let Err(e) = intake.await {
            error!(error = %e, "拉取任务异常退出");
        }
        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                error!(error = %e, "worker 异常退出");
            }
        }

        info!("分发 worker 池已停止");
    }
}

/// 拉取循环
async fn run_intake(
    queue: Arc<dyn DelayQueue>,
    tx: mpsc::Sender<Leased>,
    batch_size: usize,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    'intake: loop {
        if *shutdown.borrow() {
            break;
        }

        // 先等缓冲区有空位再拉取，避免消息在租约期内堆积在本地
        let permit = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            permit = tx.reserve() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        drop(permit);
        let max = tx.capacity().clamp(1, batch_size);

        let polled = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            polled = queue.poll(max) => polled,
        };

        let deliveries = match polled {
            Ok(deliveries) => deliveries,
            Err(e) => {
                error!(error = %e, "拉取延迟队列失败");
                Vec::new()
            }
        };

        if deliveries.is_empty() {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
            continue;
        }

        debug!(count = deliveries.len(), "拉取到期消息");
        for delivery in deliveries {
            let lease = LeaseKeeper::start(queue.clone(), delivery.clone());
            // 只有拉取任务写入缓冲区，预留过的空位不会被占用
            if tx.send((delivery, lease)).await.is_err() {
                break 'intake;
            }
        }
    }

    info!("拉取任务收到关闭信号，停止拉取");
}

/// worker 循环
async fn run_worker(
    worker_id: usize,
    rx: SharedReceiver,
    handler: Arc<DispatchHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let delivery = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            delivery = async { rx.lock().await.recv().await } => delivery,
        };

        let Some((delivery, _lease)) = delivery else {
            break;
        };

        let outcome = handler.handle(&delivery).await;
        debug!(worker_id, message_id = %delivery.message_id, ?outcome, "消息处理完成");
    }

    info!(worker_id, "worker 已退出");
}
