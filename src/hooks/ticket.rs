//! 工单钩子 - 新建和更新工单时发通知

use std::sync::Arc;

use tracing::debug;

use crate::config::SETTING_POST_TICKETS;
use crate::host::HostContext;
use crate::notification::{
    apply_project_flow, shall_post, GeneratorKind, Notification, NotificationDispatcher, Payload,
    TicketPayloadGenerator,
};
use crate::ticket::{Change, Ticket};

/// 工单钩子
pub struct FlowdockTicketHook {
    host: HostContext,
    dispatcher: Arc<NotificationDispatcher>,
    generator: Box<dyn TicketPayloadGenerator>,
}

impl FlowdockTicketHook {
    /// 按配置选择 payload 生成器
    pub fn new(host: HostContext, dispatcher: Arc<NotificationDispatcher>) -> Self {
        let generator = GeneratorKind::from_settings(host.settings.as_ref()).generator();
        debug!(generator = generator.name(), "Ticket payload generator selected");
        Self {
            host,
            dispatcher,
            generator,
        }
    }

    pub fn generator_name(&self) -> &'static str {
        self.generator.name()
    }

    /// 新建工单，返回是否提交了通知
    pub fn on_ticket_created(&self, ticket: &Ticket) -> bool {
        if !self.shall_post(ticket) {
            return false;
        }
        let payload = self.generator.generate_new(&self.host, ticket);
        self.submit(ticket, payload)
    }

    /// 工单更新，返回是否提交了通知
    pub fn on_ticket_updated(&self, ticket: &Ticket, change: &Change) -> bool {
        if !self.shall_post(ticket) {
            return false;
        }
        let payload = self.generator.generate_update(&self.host, ticket, change);
        self.submit(ticket, payload)
    }

    fn shall_post(&self, ticket: &Ticket) -> bool {
        let settings = self.host.settings.as_ref();
        if !settings.get_bool(SETTING_POST_TICKETS, true) {
            debug!(ticket = ticket.number, "Ticket notifications disabled");
            return false;
        }
        shall_post(settings, &self.host.repository(&ticket.repository))
    }

    fn submit(&self, ticket: &Ticket, payload: Option<Payload>) -> bool {
        let Some(payload) = payload else {
            debug!(ticket = ticket.number, "Ticket change not reported");
            return false;
        };
        let repository = self.host.repository(&ticket.repository);
        let notification = apply_project_flow(self.host.settings.as_ref(), &repository, Notification::new(payload));
        self.dispatcher.send_async(notification).is_ok()
    }
}
