//! 宿主钩子
//!
//! 宿主在 push 完成、工单新建/更新后同步调用这些钩子。
//! 分类、提交范围解析和渲染在调用线程内完成，只有网络投递交给分发器。

pub mod receive;
pub mod ticket;

pub use receive::{FlowdockReceiveHook, PushEvent, ReceiveCommand};
pub use ticket::FlowdockTicketHook;
