//! 异步投递失败：不影响提交方，只产生一条错误日志
//!
//! 全局 subscriber 只能安装一次，所以这个测试单独一个二进制。

use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use flowdock_notify::notification::FlowdockTransport;
use flowdock_notify::{MemorySettings, MessagePayload, Notification, NotificationDispatcher};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

static ERRORS: AtomicUsize = AtomicUsize::new(0);

struct ErrorCounter;

impl<S: Subscriber> Layer<S> for ErrorCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() == Level::ERROR && meta.target().starts_with("flowdock_notify") {
            ERRORS.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// 绑定后立即释放的端口，连接会被拒绝
fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

#[test]
fn test_failed_async_delivery_logs_once() {
    tracing_subscriber::registry().with(ErrorCounter).init();

    let settings = MemorySettings::new()
        .with("flowdock.apiUrl", closed_port_url())
        .with("flowdock.defaultToken", "T0")
        .with("flowdock.connectTimeout", "1");
    let transport = FlowdockTransport::from_settings(Arc::new(settings)).unwrap();
    let dispatcher = NotificationDispatcher::start(transport).unwrap();

    let result = dispatcher.send_async(Notification::new(MessagePayload::new("subject", "content")));
    assert!(result.is_ok());

    dispatcher.stop();

    assert_eq!(dispatcher.stats().failed(), 1);
    assert_eq!(dispatcher.stats().delivered(), 0);
    assert_eq!(ERRORS.load(Ordering::SeqCst), 1);
}
