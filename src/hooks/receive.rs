//! push 钩子 - 每个 ref 更新发一条 git 通知

use std::sync::Arc;

use tracing::{debug, error};

use crate::config::{
    SETTING_FIXED_COMMIT_TAGS, SETTING_MAX_COMMITS, SETTING_POST_BRANCHES, SETTING_POST_TAGS,
    DEFAULT_MAX_COMMITS,
};
use crate::graph::{resolve_range_or_empty, CommitRange, WalkOrder};
use crate::host::{HostContext, Identity, RepositoryModel};
use crate::notification::{
    apply_project_flow, shall_post, LinkBuilder, Notification, NotificationDispatcher, PushPayload,
};

const R_HEADS: &str = "refs/heads/";
const R_TAGS: &str = "refs/tags/";

/// 一条 ref 更新
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveCommand {
    pub ref_name: String,
    pub old_id: String,
    pub new_id: String,
}

impl ReceiveCommand {
    pub fn new(ref_name: impl Into<String>, old_id: impl Into<String>, new_id: impl Into<String>) -> Self {
        Self {
            ref_name: ref_name.into(),
            old_id: old_id.into(),
            new_id: new_id.into(),
        }
    }
}

/// 一次 push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEvent {
    pub repository: String,
    /// 推送者用户名
    pub pusher: String,
    pub commands: Vec<ReceiveCommand>,
}

/// push 钩子
pub struct FlowdockReceiveHook {
    host: HostContext,
    dispatcher: Arc<NotificationDispatcher>,
}

impl FlowdockReceiveHook {
    pub fn new(host: HostContext, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { host, dispatcher }
    }

    /// push 完成后调用，返回提交到分发器的通知数
    ///
    /// 提交图的错误只记日志，不影响通知本身，也不影响 push。
    pub fn on_refs_updated(&self, event: &PushEvent) -> usize {
        let repository = self.host.repository(&event.repository);
        if !shall_post(self.host.settings.as_ref(), &repository) {
            return 0;
        }

        let pusher = self.host.users.identity(&event.pusher);
        let mut submitted = 0;

        for cmd in &event.commands {
            if !self.shall_post_ref(&cmd.ref_name) {
                continue;
            }

            let notification = self.build_notification(&repository, &pusher, cmd);
            if self.dispatcher.send_async(notification).is_ok() {
                submitted += 1;
            }
        }
        submitted
    }

    /// 只报告分支和标签，各有开关
    fn shall_post_ref(&self, ref_name: &str) -> bool {
        let settings = self.host.settings.as_ref();
        let allowed = if ref_name.starts_with(R_TAGS) {
            settings.get_bool(SETTING_POST_TAGS, true)
        } else if ref_name.starts_with(R_HEADS) {
            settings.get_bool(SETTING_POST_BRANCHES, true)
        } else {
            false
        };
        if !allowed {
            debug!(r#ref = ref_name, "Skipping ref update");
        }
        allowed
    }

    /// 构造一条 ref 更新的通知
    ///
    /// 提交图打不开或范围算不出来时提交列表为空，通知照常发送。
    pub fn build_notification(
        &self,
        repository: &RepositoryModel,
        pusher: &Identity,
        cmd: &ReceiveCommand,
    ) -> Notification {
        let settings = self.host.settings.as_ref();
        let links = LinkBuilder::from_settings(settings);
        let max_commits = usize::try_from(settings.get_int(SETTING_MAX_COMMITS, DEFAULT_MAX_COMMITS as i64))
            .unwrap_or(DEFAULT_MAX_COMMITS);
        let name = &repository.name;

        // 提交图在这次调用内打开和释放
        let range = match self.host.repositories.open_graph(name) {
            Ok(graph) => resolve_range_or_empty(graph.as_ref(), &cmd.old_id, &cmd.new_id, WalkOrder::Topo),
            Err(e) => {
                error!(repository = %name, r#ref = %cmd.ref_name, error = %e, "Failed to open repository");
                CommitRange::empty()
            }
        };

        let payload = PushPayload::new(name, links.summary(name), pusher.clone())
            .with_ref(cmd.ref_name.as_str())
            .with_ids(cmd.old_id.as_str(), cmd.new_id.as_str())
            .with_compare_url(links.push(name, &cmd.old_id, &cmd.new_id))
            .with_tags(settings.get_strings(SETTING_FIXED_COMMIT_TAGS))
            .with_commits(&range, max_commits, |id| links.commit(name, id));

        apply_project_flow(settings, repository, Notification::new(payload))
    }
}
