//! 通知管道
//!
//! 宿主事件 → 分类（工单）→ 提交范围解析 → 渲染 payload → 路由 → 分发 → HTTP
//!
//! # 模块
//! - `sanitize`：标签字符过滤
//! - `payload`：三种线上 payload 与外层 `Notification`（携带 flow）
//! - `classifier`：工单变更的通知类型判定
//! - `render` / `generator`：工单消息渲染与生成器注册表
//! - `router`：flow → token，仓库级发布开关
//! - `transport` / `dispatcher`：HTTP 投递与后台工作池
//!
//! # 使用示例
//! ```ignore
//! use flowdock_notify::notification::{FlowdockTransport, MessagePayload, Notification, NotificationDispatcher};
//!
//! let transport = FlowdockTransport::from_settings(settings)?;
//! let dispatcher = NotificationDispatcher::start(transport)?;
//! dispatcher.send_async(Notification::new(MessagePayload::new("Hello", "from Gitblit")).with_flow("ops"))?;
//! dispatcher.stop();
//! ```

pub mod classifier;
pub mod dispatcher;
pub mod generator;
pub mod links;
pub mod payload;
pub mod render;
pub mod router;
pub mod sanitize;
pub mod transport;

pub use classifier::{classify_new, classify_update, PatchsetUpdate, TicketEvent};
pub use dispatcher::{DeliveryStats, NotificationDispatcher};
pub use generator::{EmailGenerator, GeneratorKind, IssueTrackerGenerator, TicketPayloadGenerator};
pub use links::LinkBuilder;
pub use payload::{
    IssueEventType, IssuePayload, MessagePayload, Notification, Payload, PushPayload, WireEncoding,
};
pub use render::{FieldPolicy, TicketRenderer};
pub use router::{apply_project_flow, project_flow, shall_post, Route, Router};
pub use sanitize::{sanitize, sanitize_tags};
pub use transport::{FlowdockTransport, TransportConfig};
