//! 通知分发器 - 同步发送与后台异步投递
//!
//! 分发器在启动时创建一个多线程 tokio runtime 作为工作池：
//! - `send`：阻塞等待投递结果，失败返回给调用方（测试/手动命令用）
//! - `send_async`：把通知放进队列后立即返回，投递失败只记日志，不重试
//! - `stop`：不再接受新通知，等队列里已有的投递全部完成后关闭 runtime
//!
//! `send` 和 `stop` 会阻塞当前线程，不能在 async 上下文中调用。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{error, info, warn};

use super::payload::Notification;
use super::transport::FlowdockTransport;
use crate::error::DispatchError;

/// 投递计数
#[derive(Debug, Default)]
pub struct DeliveryStats {
    delivered: AtomicUsize,
    failed: AtomicUsize,
}

impl DeliveryStats {
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    fn record(&self, ok: bool) {
        let counter = if ok { &self.delivered } else { &self.failed };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

struct Worker {
    runtime: Runtime,
    queue: mpsc::UnboundedSender<Notification>,
    drain: JoinHandle<()>,
}

/// 通知分发器
pub struct NotificationDispatcher {
    transport: Arc<FlowdockTransport>,
    worker: Mutex<Option<Worker>>,
    stats: Arc<DeliveryStats>,
}

impl NotificationDispatcher {
    /// 创建分发器并启动工作池
    pub fn start(transport: FlowdockTransport) -> Result<Self, DispatchError> {
        let runtime = Builder::new_multi_thread()
            .enable_all()
            .thread_name("flowdock-worker")
            .build()?;

        let transport = Arc::new(transport);
        let stats = Arc::new(DeliveryStats::default());
        let (queue, rx) = mpsc::unbounded_channel();
        let drain = runtime.spawn(drain_queue(rx, transport.clone(), stats.clone()));

        info!(api_url = %transport.config().api_url, "Flowdock dispatcher started");

        Ok(Self {
            transport,
            worker: Mutex::new(Some(Worker {
                runtime,
                queue,
                drain,
            })),
            stats,
        })
    }

    fn worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handle(&self) -> Option<Handle> {
        self.worker().as_ref().map(|w| w.runtime.handle().clone())
    }

    /// 同步发送，投递失败返回错误
    pub fn send(&self, notification: &Notification) -> Result<(), DispatchError> {
        let handle = self.handle().ok_or(DispatchError::Stopped)?;
        let result = handle.block_on(self.transport.deliver(notification));
        self.stats.record(result.is_ok());
        result.map_err(DispatchError::from)
    }

    /// 异步发送（入队后立即返回）
    ///
    /// 分发器已停止时丢弃通知并返回 [`DispatchError::Stopped`]。
    pub fn send_async(&self, notification: Notification) -> Result<(), DispatchError> {
        let worker = self.worker();
        let Some(worker) = worker.as_ref() else {
            warn!(kind = notification.payload.kind(), "Dispatcher stopped, dropping notification");
            return Err(DispatchError::Stopped);
        };

        worker.queue.send(notification).map_err(|e| {
            warn!(kind = e.0.payload.kind(), "Dispatcher queue closed, dropping notification");
            DispatchError::Stopped
        })
    }

    /// 停止并等待队列中的投递完成，重复调用无副作用
    pub fn stop(&self) {
        let Some(Worker {
            runtime,
            queue,
            drain,
        }) = self.worker().take()
        else {
            return;
        };

        drop(queue);
        if let Err(e) = runtime.block_on(drain) {
            error!(error = %e, "Dispatcher drain task failed");
        }
        drop(runtime);

        info!(
            delivered = self.stats.delivered(),
            failed = self.stats.failed(),
            "Flowdock dispatcher stopped"
        );
    }

    pub fn is_running(&self) -> bool {
        self.worker().is_some()
    }

    pub fn stats(&self) -> &DeliveryStats {
        &self.stats
    }
}

impl Drop for NotificationDispatcher {
    fn drop(&mut self) {
        if !self.is_running() {
            return;
        }
        if Handle::try_current().is_ok() {
            // async 上下文中无法阻塞等待，直接放弃排队中的通知
            if let Some(worker) = self.worker().take() {
                warn!("Dispatcher dropped inside a runtime, pending notifications discarded");
                worker.runtime.shutdown_background();
            }
            return;
        }
        self.stop();
    }
}

async fn drain_queue(
    mut rx: mpsc::UnboundedReceiver<Notification>,
    transport: Arc<FlowdockTransport>,
    stats: Arc<DeliveryStats>,
) {
    let mut tasks = JoinSet::new();

    while let Some(notification) = rx.recv().await {
        let transport = transport.clone();
        let stats = stats.clone();
        tasks.spawn(async move { deliver_logged(&transport, &notification, &stats).await });

        reap_finished(&mut tasks);
    }

    while let Some(result) = tasks.join_next().await {
        log_aborted(result);
    }
}

/// 回收已完成的任务，返回其中异常结束的数量
fn reap_finished(tasks: &mut JoinSet<()>) -> usize {
    let mut aborted = 0;
    while let Some(result) = tasks.try_join_next() {
        if log_aborted(result) {
            aborted += 1;
        }
    }
    aborted
}

fn log_aborted(result: Result<(), JoinError>) -> bool {
    match result {
        Ok(()) => false,
        Err(e) => {
            error!(error = %e, "Notification task aborted");
            true
        }
    }
}

/// 投递一条通知，失败时记一条错误日志
async fn deliver_logged(transport: &FlowdockTransport, notification: &Notification, stats: &DeliveryStats) {
    match transport.deliver(notification).await {
        Ok(()) => stats.record(true),
        Err(e) => {
            stats.record(false);
            let json = notification.payload.to_json().unwrap_or_default();
            error!(
                kind = notification.payload.kind(),
                flow = ?notification.flow(),
                payload = %json,
                error = %e,
                "Failed to post notification to Flowdock"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemorySettings;
    use crate::error::DeliveryError;
    use crate::notification::payload::MessagePayload;

    /// 没有任何 token：投递在路由阶段就失败，不会碰网络
    fn dispatcher_without_tokens() -> NotificationDispatcher {
        let transport = FlowdockTransport::from_settings(Arc::new(MemorySettings::new())).unwrap();
        NotificationDispatcher::start(transport).unwrap()
    }

    fn message() -> Notification {
        Notification::new(MessagePayload::new("subject", "content"))
    }

    #[test]
    fn test_sync_send_surfaces_errors() {
        let dispatcher = dispatcher_without_tokens();
        let err = dispatcher.send(&message()).unwrap_err();
        assert!(matches!(err, DispatchError::Delivery(DeliveryError::MissingToken(_))));
        assert_eq!(dispatcher.stats().failed(), 1);
        dispatcher.stop();
    }

    #[test]
    fn test_async_failures_are_counted_not_returned() {
        let dispatcher = dispatcher_without_tokens();
        for _ in 0..3 {
            assert!(dispatcher.send_async(message()).is_ok());
        }
        dispatcher.stop();

        assert_eq!(dispatcher.stats().failed(), 3);
        assert_eq!(dispatcher.stats().delivered(), 0);
    }

    #[test]
    fn test_stopped_dispatcher_rejects_work() {
        let dispatcher = dispatcher_without_tokens();
        dispatcher.stop();
        assert!(!dispatcher.is_running());

        assert!(matches!(dispatcher.send_async(message()), Err(DispatchError::Stopped)));
        assert!(matches!(dispatcher.send(&message()), Err(DispatchError::Stopped)));

        // 重复 stop 无副作用
        dispatcher.stop();
    }

    #[test]
    fn test_reap_reports_panicked_tasks() {
        let runtime = Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let mut tasks = JoinSet::new();
            tasks.spawn(async {});
            tasks.spawn(async { panic!("transport bug") });

            let mut aborted = 0;
            while !tasks.is_empty() {
                tokio::task::yield_now().await;
                aborted += reap_finished(&mut tasks);
            }
            assert_eq!(aborted, 1);
        });
    }
}
