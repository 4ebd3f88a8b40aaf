//! 错误类型
//!
//! 通知管道只有两类真正的错误：提交范围解析失败和投递失败。
//! 抑制（不发通知）和路由回退都不是错误，分别用 `Option` 和 `Route` 表达。

/// 提交图解析错误（GraphResolutionError）
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("cannot resolve revision '{0}'")]
    UnresolvedRevision(String),

    #[error("commit {0} not found")]
    MissingCommit(String),

    #[error("repository '{0}' not found")]
    MissingRepository(String),

    #[error("graph backend failed: {0}")]
    Backend(String),
}

impl From<git2::Error> for GraphError {
    fn from(e: git2::Error) -> Self {
        GraphError::Backend(e.message().to_string())
    }
}

/// 投递错误（DeliveryError）
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// 端点返回非 200，携带完整响应体
    #[error("flowdock returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    /// 既没有 flow token 也没有默认 token
    #[error("no flowdock token configured for flow '{0}'")]
    MissingToken(String),
}

/// 分发器错误
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatcher has been stopped")]
    Stopped,

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("failed to start worker runtime: {0}")]
    Runtime(#[from] std::io::Error),
}
