//! 从页面内联脚本和响应头中提取握手参数。
//!
//! 教务系统改版时通常只需要调整这里的模式。

use std::sync::LazyLock;

use regex::Regex;

static SESSION_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"var\s+_sessionid\s*=\s*"([A-Fa-f0-9]+)""#).expect("valid session id pattern")
});
static DES_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"var\s+_deskey\s*=\s*['"]([^'"]+)['"]"#).expect("valid deskey pattern")
});
static NOW_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"var\s+_nowtime\s*=\s*['"]([^'"]+)['"]"#).expect("valid nowtime pattern")
});

/// 内联脚本变量提取器
pub struct ScriptVars;

impl ScriptVars {
    /// 登录页中的 `var _sessionid = "..."`
    pub fn session_id(markup: &str) -> Option<String> {
        capture(&SESSION_ID, markup)
    }

    /// 加密参数脚本中的 `var _deskey = '...'`
    pub fn cipher_key(script: &str) -> Option<String> {
        capture(&DES_KEY, script)
    }

    /// 加密参数脚本中的 `var _nowtime = '...'`（服务器时间）
    pub fn server_timestamp(script: &str) -> Option<String> {
        capture(&NOW_TIME, script)
    }
}

fn capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|v| !v.is_empty())
}

/// 在一组 `Set-Cookie` 头中查找指定 Cookie 的值
pub fn cookie_value(set_cookies: &[String], name: &str) -> Option<String> {
    set_cookies.iter().find_map(|header| {
        let pair = header.split(';').next()?;
        let (key, value) = pair.split_once('=')?;
        (key.trim() == name && !value.trim().is_empty()).then(|| value.trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_session_id() {
        let html = r#"<script type="text/javascript">
            var _sessionid = "9F86D081884C7D65";
            var _ctx = "/";
        </script>"#;
        assert_eq!(ScriptVars::session_id(html).as_deref(), Some("9F86D081884C7D65"));
        assert_eq!(ScriptVars::session_id("var _sessionid = \"\";"), None);
        assert_eq!(ScriptVars::session_id("<html></html>"), None);
    }

    #[test]
    fn extracts_encrypt_params() {
        let js = "var _deskey = 'a1b2c3d4e5';\nvar _nowtime = '2025-10-26 00:17:41';";
        assert_eq!(ScriptVars::cipher_key(js).as_deref(), Some("a1b2c3d4e5"));
        assert_eq!(
            ScriptVars::server_timestamp(js).as_deref(),
            Some("2025-10-26 00:17:41")
        );
        assert_eq!(ScriptVars::cipher_key("var _other = 'x';"), None);
    }

    #[test]
    fn finds_cookie_among_headers() {
        let headers = vec![
            "route=abc; Path=/".to_string(),
            "JSESSIONID=8E3A1C; Path=/; HttpOnly".to_string(),
        ];
        assert_eq!(cookie_value(&headers, "JSESSIONID").as_deref(), Some("8E3A1C"));
        assert_eq!(cookie_value(&headers, "missing"), None);
        assert_eq!(cookie_value(&["JSESSIONID=; Path=/".to_string()], "JSESSIONID"), None);
    }
}
