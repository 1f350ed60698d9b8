use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};

use crate::{Error, Result, portal::SESSION_COOKIE};

/// 部分部署会拒绝缺少浏览器特征的请求
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// 发往教务系统的一次请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalRequest {
    pub method: Method,
    pub url: String,
    /// JSESSIONID 的值
    pub session_cookie: Option<String>,
    pub referer: Option<String>,
    /// 表单正文，原样发送，不再做 URL 编码
    pub form_body: Option<String>,
}

impl PortalRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            session_cookie: None,
            referer: None,
            form_body: None,
        }
    }

    pub fn post_form(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            form_body: Some(body.into()),
            ..Self::get(url)
        }
    }

    #[must_use]
    pub fn with_session(mut self, cookie: &str) -> Self {
        self.session_cookie = Some(cookie.to_string());
        self
    }

    #[must_use]
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }
}

/// 教务系统的响应，只保留握手需要的部分
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalResponse {
    pub status: u16,
    /// 全部 `Set-Cookie` 头的原始值
    pub set_cookies: Vec<String>,
    pub body: String,
}

/// 出站 HTTP 能力
#[async_trait]
pub trait Transport: Send + Sync {
    /// 发送请求；传输失败、超时或非 2xx 状态都返回 `Error::Network`
    async fn send(&self, request: PortalRequest) -> Result<PortalResponse>;
}

/// 基于 reqwest 的传输实现
///
/// 客户端在并发请求之间共享，因此不开启 cookie store：会话 Cookie 只由
/// `PortalRequest::session_cookie` 逐请求携带，跟随重定向时中间跳转的
/// `Set-Cookie` 不会被记录。
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(BROWSER_USER_AGENT)
            .default_headers({
                let mut headers = header::HeaderMap::new();
                headers.insert(header::ACCEPT, header::HeaderValue::from_static("*/*"));
                headers
            })
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: PortalRequest) -> Result<PortalResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };

        if let Some(cookie) = &request.session_cookie {
            builder = builder.header(header::COOKIE, format!("{SESSION_COOKIE}={cookie}"));
        }
        if let Some(referer) = &request.referer {
            builder = builder.header(header::REFERER, referer);
        }
        if let Some(body) = request.form_body {
            builder = builder
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let set_cookies = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();

        if !status.is_success() {
            return Err(Error::Network(format!("HTTP {status} from {}", request.url)));
        }

        let body = response.text().await?;
        Ok(PortalResponse {
            status: status.as_u16(),
            set_cookies,
            body,
        })
    }
}
