//! 标签清洗
//!
//! Flowdock 的 tag、source、project 只接受有限字符：保留字母、数字、`-`、`_`，
//! `/` 替换为 `_`，其余丢弃。

/// 把任意文本过滤为允许的字符集
pub fn sanitize(value: &str) -> String {
    value
        .chars()
        .filter_map(|c| match c {
            c if c.is_alphanumeric() => Some(c),
            '-' | '_' => Some(c),
            '/' => Some('_'),
            _ => None,
        })
        .collect()
}

/// 逐个清洗，丢弃清洗后为空的标签
pub fn sanitize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| sanitize(t.as_ref()))
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_branch_name() {
        assert_eq!(sanitize("feature/login-v2!"), "feature_login-v2");
    }

    #[test]
    fn test_sanitize_drops_punctuation_and_spaces() {
        assert_eq!(sanitize("v1.0 release (beta)"), "v10releasebeta");
        assert_eq!(sanitize("a_b-c"), "a_b-c");
    }

    #[test]
    fn test_sanitize_keeps_unicode_letters() {
        assert_eq!(sanitize("修复/登录"), "修复_登录");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        for input in ["feature/login-v2!", "~jane/repo.git", "", "___", "a/b/c", "ü/ß!"] {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "input: {input}");
        }
    }

    #[test]
    fn test_sanitize_tags_drops_empty() {
        let tags = sanitize_tags(["ticket-1", "!!!", "bug fix"]);
        assert_eq!(tags, vec!["ticket-1", "bugfix"]);
    }
}
