//! 目标路由 - flow 到 token 的解析与仓库级发布开关

use std::sync::Arc;

use tracing::{debug, warn};

use super::payload::Notification;
use crate::config::{
    flow_token_key, Settings, SETTING_DEFAULT_TOKEN, SETTING_POST_PERSONAL_REPOS,
    SETTING_USE_PROJECT_FLOWS,
};
use crate::error::DeliveryError;
use crate::host::RepositoryModel;

/// 路由结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// 请求的 flow，空表示默认
    pub flow: Option<String>,
    pub token: String,
    /// 请求的 flow 没有 token，已回退到默认 token
    pub fallback: bool,
}

/// flow 路由器
#[derive(Clone)]
pub struct Router {
    settings: Arc<dyn Settings>,
}

impl Router {
    pub fn new(settings: Arc<dyn Settings>) -> Self {
        Self { settings }
    }

    /// 解析 flow 的 token
    ///
    /// flow 为空用默认 token；flow 没有配置 token 时回退到默认 token 并告警，
    /// 通知照常发往默认 flow。默认 token 也没有时返回 [`DeliveryError::MissingToken`]。
    pub fn resolve(&self, flow: Option<&str>) -> Result<Route, DeliveryError> {
        let flow = flow.filter(|f| !f.is_empty());
        let default_token = self.settings.get_non_empty(SETTING_DEFAULT_TOKEN);

        let Some(flow) = flow else {
            let token = default_token.ok_or_else(|| DeliveryError::MissingToken(String::new()))?;
            return Ok(Route {
                flow: None,
                token,
                fallback: false,
            });
        };

        let key = flow_token_key(flow);
        if let Some(token) = self.settings.get_non_empty(&key) {
            debug!(flow, "Resolved flow token");
            return Ok(Route {
                flow: Some(flow.to_string()),
                token,
                fallback: false,
            });
        }

        let token = default_token.ok_or_else(|| DeliveryError::MissingToken(flow.to_string()))?;
        warn!(flow, "No Flowdock token specified for flow, posting to the default flow");
        warn!(flow, key = %key, "Please add {} to gitblit.properties", key);
        Ok(Route {
            flow: Some(flow.to_string()),
            token,
            fallback: true,
        })
    }
}

/// 仓库级开关：个人仓库且未开启 postPersonalRepos 时不发任何通知
pub fn shall_post(settings: &dyn Settings, repository: &RepositoryModel) -> bool {
    if repository.is_personal() && !settings.get_bool(SETTING_POST_PERSONAL_REPOS, false) {
        debug!(repository = %repository.name, "Skipping personal repository");
        return false;
    }
    true
}

/// 开启 useProjectFlows 且仓库属于某个项目时，返回项目路径作为 flow
pub fn project_flow(settings: &dyn Settings, repository: &RepositoryModel) -> Option<String> {
    if !settings.get_bool(SETTING_USE_PROJECT_FLOWS, false) {
        return None;
    }
    Some(repository.project_path.clone()).filter(|p| !p.is_empty())
}

/// 调用方未指定 flow 时套用项目 flow
pub fn apply_project_flow(
    settings: &dyn Settings,
    repository: &RepositoryModel,
    notification: Notification,
) -> Notification {
    match project_flow(settings, repository) {
        Some(flow) => notification.with_default_flow(flow),
        None => notification,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemorySettings;
    use crate::notification::payload::MessagePayload;

    fn router(settings: MemorySettings) -> Router {
        Router::new(Arc::new(settings))
    }

    #[test]
    fn test_empty_flow_uses_default_token() {
        let r = router(MemorySettings::new().with(SETTING_DEFAULT_TOKEN, "T0"));
        let route = r.resolve(None).unwrap();
        assert_eq!(route.token, "T0");
        assert!(!route.fallback);

        let route = r.resolve(Some("")).unwrap();
        assert_eq!(route.token, "T0");
        assert_eq!(route.flow, None);
    }

    #[test]
    fn test_flow_token_lookup() {
        let r = router(
            MemorySettings::new()
                .with(SETTING_DEFAULT_TOKEN, "T0")
                .with("flowdock.acme.token", "T1"),
        );
        let route = r.resolve(Some("acme")).unwrap();
        assert_eq!(route.token, "T1");
        assert!(!route.fallback);
    }

    #[test]
    fn test_missing_flow_token_falls_back() {
        let r = router(MemorySettings::new().with(SETTING_DEFAULT_TOKEN, "T0"));
        let route = r.resolve(Some("acme")).unwrap();
        assert_eq!(route.token, "T0");
        assert!(route.fallback);
        assert_eq!(route.flow.as_deref(), Some("acme"));
    }

    #[test]
    fn test_no_tokens_at_all() {
        let r = router(MemorySettings::new());
        assert!(matches!(r.resolve(None), Err(DeliveryError::MissingToken(_))));
        assert!(matches!(r.resolve(Some("acme")), Err(DeliveryError::MissingToken(f)) if f == "acme"));
    }

    #[test]
    fn test_shall_post_personal_repos() {
        let personal = RepositoryModel::new("~jane/scratch.git");
        let shared = RepositoryModel::new("team/app.git");

        let off = MemorySettings::new();
        assert!(!shall_post(&off, &personal));
        assert!(shall_post(&off, &shared));

        let on = MemorySettings::new().with(SETTING_POST_PERSONAL_REPOS, "true");
        assert!(shall_post(&on, &personal));
    }

    #[test]
    fn test_project_flow_defaulting() {
        let repo = RepositoryModel::new("team/app.git");
        let settings = MemorySettings::new().with(SETTING_USE_PROJECT_FLOWS, "true");

        let n = apply_project_flow(&settings, &repo, Notification::new(MessagePayload::new("s", "c")));
        assert_eq!(n.flow(), Some("team"));

        // 调用方已指定的 flow 不被覆盖
        let n = Notification::new(MessagePayload::new("s", "c")).with_flow("ops");
        let n = apply_project_flow(&settings, &repo, n);
        assert_eq!(n.flow(), Some("ops"));

        // 根目录仓库没有项目
        let root = RepositoryModel::new("app.git");
        assert_eq!(project_flow(&settings, &root), None);

        // 开关关闭
        assert_eq!(project_flow(&MemorySettings::new(), &repo), None);
    }
}
