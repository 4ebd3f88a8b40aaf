//! 宿主 Web 界面链接

use crate::config::{Settings, DEFAULT_CANONICAL_URL, SETTING_CANONICAL_URL};

/// 按 `web.canonicalUrl` 拼接提交、日志、对比、概要和工单页面链接
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkBuilder {
    canonical_url: String,
}

impl LinkBuilder {
    pub fn new(canonical_url: impl Into<String>) -> Self {
        let canonical_url: String = canonical_url.into();
        Self {
            canonical_url: canonical_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_settings(settings: &dyn Settings) -> Self {
        Self::new(
            settings
                .get_non_empty(SETTING_CANONICAL_URL)
                .unwrap_or_else(|| DEFAULT_CANONICAL_URL.to_string()),
        )
    }

    pub fn commit(&self, repository: &str, id: &str) -> String {
        format!("{}/commit?r={}&h={}", self.canonical_url, repository, id)
    }

    pub fn log(&self, repository: &str, id: &str) -> String {
        format!("{}/log?r={}&h={}", self.canonical_url, repository, id)
    }

    pub fn compare(&self, repository: &str, old_id: &str, new_id: &str) -> String {
        format!(
            "{}/compare?r={}&h={}..{}",
            self.canonical_url, repository, old_id, new_id
        )
    }

    /// push 的链接：新建 ref 指向新提交，删除 ref 指向旧日志，其余为对比页
    pub fn push(&self, repository: &str, old_id: &str, new_id: &str) -> String {
        match (is_zero_id(old_id), is_zero_id(new_id)) {
            (true, true) => self.summary(repository),
            (true, false) => self.commit(repository, new_id),
            (false, true) => self.log(repository, old_id),
            (false, false) => self.compare(repository, old_id, new_id),
        }
    }

    pub fn summary(&self, repository: &str) -> String {
        format!("{}/summary?r={}", self.canonical_url, repository)
    }

    pub fn ticket(&self, repository: &str, number: u64) -> String {
        format!("{}/tickets?r={}&h={}", self.canonical_url, repository, number)
    }
}

/// 空串或全 0 的对象 id
fn is_zero_id(id: &str) -> bool {
    id.chars().all(|c| c == '0')
}

impl Default for LinkBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_CANONICAL_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemorySettings;

    #[test]
    fn test_links_use_default_canonical_url() {
        let links = LinkBuilder::from_settings(&MemorySettings::new());
        assert_eq!(links.summary("app.git"), "https://localhost:8443/summary?r=app.git");
        assert_eq!(links.commit("app.git", "abc"), "https://localhost:8443/commit?r=app.git&h=abc");
        assert_eq!(links.log("app.git", "abc"), "https://localhost:8443/log?r=app.git&h=abc");
    }

    #[test]
    fn test_links_trim_trailing_slash() {
        let settings = MemorySettings::new().with(SETTING_CANONICAL_URL, "https://git.example.com/");
        let links = LinkBuilder::from_settings(&settings);
        assert_eq!(
            links.compare("team/app.git", "a1", "b2"),
            "https://git.example.com/compare?r=team/app.git&h=a1..b2"
        );
        assert_eq!(links.ticket("team/app.git", 12), "https://git.example.com/tickets?r=team/app.git&h=12");
    }

    #[test]
    fn test_push_link_by_ref_update() {
        let links = LinkBuilder::new("https://git.example.com");
        let zero = "0".repeat(40);
        assert_eq!(links.push("app.git", &zero, "b2"), "https://git.example.com/commit?r=app.git&h=b2");
        assert_eq!(links.push("app.git", "a1", &zero), "https://git.example.com/log?r=app.git&h=a1");
        assert_eq!(links.push("app.git", "a1", "b2"), "https://git.example.com/compare?r=app.git&h=a1..b2");
        assert_eq!(links.push("app.git", "", ""), "https://git.example.com/summary?r=app.git");
    }
}
