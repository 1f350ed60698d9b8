use serde_json::Value;

use crate::{
    AuthenticatedIdentity, Error, Result,
    portal::{
        TERM_CONTEXT_PATH, TIMETABLE_PATH, TIMETABLE_REFERER_PATH, base64_encode,
        transport::{PortalRequest, Transport},
    },
};

/// 登录后获取学年学期与课表页面
pub struct ScheduleFetcher<'a> {
    transport: &'a dyn Transport,
    base_url: String,
}

impl<'a> ScheduleFetcher<'a> {
    pub fn new(transport: &'a dyn Transport, base_url: &str) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// 查询当前学年学期和用户代码
    pub async fn resolve_term_context(&self, session_cookie: &str) -> Result<AuthenticatedIdentity> {
        let request = PortalRequest::get(self.url(TERM_CONTEXT_PATH))
            .with_session(session_cookie)
            .with_referer(self.url(TERM_CONTEXT_PATH));
        let response = self.transport.send(request).await?;

        let json: Value = serde_json::from_str(&response.body)
            .map_err(|e| Error::Protocol(format!("term context is not JSON: {e}")))?;

        let field = |key: &str| {
            json_text(&json, key)
                .ok_or_else(|| Error::Protocol(format!("term context field '{key}' missing")))
        };
        let identity = AuthenticatedIdentity {
            session_cookie: session_cookie.to_string(),
            school_year: field("xn")?,
            term: field("xqM")?,
            user_code: field("userCode")?,
        };

        tracing::info!(
            "Resolved term {}-{} for user code {}",
            identity.school_year,
            identity.term,
            identity.user_code
        );
        Ok(identity)
    }

    /// 获取课表页面原文，不做任何解析
    pub async fn fetch_timetable_document(&self, identity: &AuthenticatedIdentity) -> Result<String> {
        let params = timetable_params(identity);
        let request = PortalRequest::get(format!("{}?params={params}", self.url(TIMETABLE_PATH)))
            .with_session(&identity.session_cookie)
            .with_referer(self.url(TIMETABLE_REFERER_PATH));

        let response = self.transport.send(request).await?;
        tracing::debug!("timetable document fetched, {} bytes", response.body.len());
        Ok(response.body)
    }
}

/// 课表页面查询参数：`base64("xn=<学年>&xq=<学期>&xh=<用户代码>")`
pub fn timetable_params(identity: &AuthenticatedIdentity) -> String {
    base64_encode(&format!(
        "xn={}&xq={}&xh={}",
        identity.school_year, identity.term, identity.user_code
    ))
}

/// 字符串或数字字段，空值视为缺失
fn json_text(json: &Value, key: &str) -> Option<String> {
    match json.get(key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
