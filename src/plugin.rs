//! 插件生命周期
//!
//! `start` 创建分发器（工作池）和两个钩子，钩子通过 `Arc` 共享同一个分发器；
//! `stop` 等待排队中的投递完成后关闭工作池。

use std::sync::Arc;

use tracing::info;

use crate::error::DispatchError;
use crate::hooks::{FlowdockReceiveHook, FlowdockTicketHook};
use crate::host::{HostContext, Identity, HOST_NAME};
use crate::notification::{FlowdockTransport, MessagePayload, Notification, NotificationDispatcher};

/// Flowdock 插件
pub struct FlowdockPlugin {
    dispatcher: Arc<NotificationDispatcher>,
    receive_hook: FlowdockReceiveHook,
    ticket_hook: FlowdockTicketHook,
}

impl FlowdockPlugin {
    pub fn start(host: HostContext) -> Result<Self, DispatchError> {
        let transport = FlowdockTransport::from_settings(host.settings.clone())?;
        let dispatcher = Arc::new(NotificationDispatcher::start(transport)?);

        let receive_hook = FlowdockReceiveHook::new(host.clone(), dispatcher.clone());
        let ticket_hook = FlowdockTicketHook::new(host, dispatcher.clone());
        info!(generator = ticket_hook.generator_name(), "Flowdock plugin started");

        Ok(Self {
            dispatcher,
            receive_hook,
            ticket_hook,
        })
    }

    pub fn receive_hook(&self) -> &FlowdockReceiveHook {
        &self.receive_hook
    }

    pub fn ticket_hook(&self) -> &FlowdockTicketHook {
        &self.ticket_hook
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    /// 同步发送测试消息，失败返回错误
    pub fn send_test(&self, flow: Option<&str>, from: &Identity) -> Result<(), DispatchError> {
        self.dispatcher.send(&test_message(flow, from))
    }

    /// 异步发送一条消息（标题和正文相同）
    pub fn post(&self, flow: Option<&str>, from: &Identity, message: &str) -> Result<(), DispatchError> {
        let payload = MessagePayload::new(message, message).with_from(from);
        self.dispatcher.send_async(with_flow(Notification::new(payload), flow))
    }

    pub fn stop(&self) {
        self.dispatcher.stop();
        info!("Flowdock plugin stopped");
    }
}

/// 测试消息
pub fn test_message(flow: Option<&str>, from: &Identity) -> Notification {
    let payload = MessagePayload::new(
        format!("Test message from {}", HOST_NAME),
        format!("Test message sent from {}", HOST_NAME),
    )
    .with_from(from);
    with_flow(Notification::new(payload), flow)
}

fn with_flow(notification: Notification, flow: Option<&str>) -> Notification {
    match flow {
        Some(flow) => notification.with_flow(flow),
        None => notification,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::Payload;

    #[test]
    fn test_test_message() {
        let n = test_message(Some("ops"), &Identity::parse("Jane Doe <jane@example.com>"));
        assert_eq!(n.flow(), Some("ops"));
        let Payload::Message(msg) = &n.payload else {
            panic!("expected a message payload");
        };
        assert_eq!(msg.subject, "Test message from Gitblit");
        assert_eq!(msg.content, "Test message sent from Gitblit");
        assert_eq!(msg.from_address.as_deref(), Some("jane@example.com"));

        assert_eq!(test_message(None, &Identity::new("x", None)).flow(), None);
    }
}
