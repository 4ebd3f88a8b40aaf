//! Flowdock Notify - 把 Gitblit 的 push 和工单事件发到 Flowdock flow

pub mod config;
pub mod error;
pub mod graph;
pub mod hooks;
pub mod host;
pub mod notification;
pub mod plugin;
pub mod ticket;

pub use config::{MemorySettings, PropertiesSettings, Settings};
pub use error::{DeliveryError, DispatchError, GraphError};
pub use graph::{resolve_range, resolve_range_or_empty, CommitRange, CommitRecord, RevisionGraph, WalkOrder};
pub use hooks::{FlowdockReceiveHook, FlowdockTicketHook, PushEvent, ReceiveCommand};
pub use host::{
    BasicRenderer, HostContext, Identity, RepositoryDirectory, RepositoryModel, RichTextRenderer,
    StaticUsers, UserDirectory, UserModel,
};
pub use notification::{
    MessagePayload, Notification, NotificationDispatcher, Payload, PushPayload, Route, Router,
};
pub use plugin::FlowdockPlugin;
pub use ticket::{Change, Field, Patchset, PatchsetType, Review, Score, Status, Ticket, TicketType};
