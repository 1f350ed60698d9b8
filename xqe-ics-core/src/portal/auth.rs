use serde_json::Value;

use crate::{
    Credentials, Error, Result, SessionContext,
    cipher::Cipher,
    portal::{
        ENCRYPT_PARAMS_PATH, LOGIN_PAGE_PATH, LOGIN_SUBMIT_PATH, SESSION_COOKIE, base64_encode,
        extract::{ScriptVars, cookie_value},
        md5_hex,
        transport::{PortalRequest, Transport},
    },
};

/// 登录表单中的固定策略字段
const POLICY_FLAGS: &str = "&randnumber=&isPasswordPolicy=1&txt_mm_expression=14&txt_mm_length=15&txt_mm_userzh=0&hid_flag=1&hidlag=1&hid_dxyzm=";

/// 登录握手状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Init,
    CookieBootstrapped,
    ParamsDiscovered,
    CredentialsEncrypted,
    LoggedIn,
    /// 已拿到登录后轮换的会话 Cookie
    SessionRenewed,
    Failed(String),
}

/// 组装登录请求正文，纯函数
///
/// 字段顺序与编码方式由教务系统前端脚本决定，必须逐字一致。
pub fn build_login_payload(
    cipher: &dyn Cipher,
    student_id: &str,
    password_digest: &str,
    timestamp: &str,
    cipher_key: &str,
    internal_session_id: &str,
) -> Result<String> {
    let user = base64_encode(&format!("{student_id};;{internal_session_id}"));
    let password = md5_hex(&format!("{password_digest}{}", md5_hex("")));
    let intermediate = format!("_u={user}&_p={password}{POLICY_FLAGS}");

    let token = md5_hex(&format!("{}{}", md5_hex(&intermediate), md5_hex(timestamp)));
    let params = base64_encode(&cipher.encrypt(&intermediate, cipher_key)?);

    Ok(format!(
        "params={params}&token={token}&timestamp={timestamp}&deskey={cipher_key}&ssessionid={internal_session_id}"
    ))
}

/// 模拟浏览器登录流程的会话
///
/// 每次请求独立创建，不做任何内部重试；任何一步失败后会话进入 `Failed`。
pub struct AuthSession<'a> {
    transport: &'a dyn Transport,
    cipher: &'a dyn Cipher,
    base_url: String,
    context: SessionContext,
    state: AuthState,
    payload: Option<String>,
    renewed_cookie: Option<String>,
}

impl<'a> AuthSession<'a> {
    pub fn new(transport: &'a dyn Transport, cipher: &'a dyn Cipher, base_url: &str) -> Self {
        Self {
            transport,
            cipher,
            base_url: base_url.trim_end_matches('/').to_string(),
            context: SessionContext::default(),
            state: AuthState::Init,
            payload: None,
            renewed_cookie: None,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn fail(&mut self, error: Error) -> Error {
        tracing::debug!("login handshake failed in state {:?}: {}", self.state, error);
        self.state = AuthState::Failed(error.to_string());
        error
    }

    fn expect_state(&mut self, expected: &AuthState, operation: &str) -> Result<()> {
        if &self.state == expected {
            return Ok(());
        }
        let error = Error::Protocol(format!(
            "{operation} requires state {expected:?}, session is {:?}",
            self.state
        ));
        Err(self.fail(error))
    }

    /// 获取登录页：记录 JSESSIONID 与页面内嵌的 `_sessionid`
    pub async fn bootstrap(&mut self) -> Result<()> {
        self.expect_state(&AuthState::Init, "bootstrap")?;
        let result = self.bootstrap_inner().await;
        self.finish_step(result, AuthState::CookieBootstrapped)
    }

    async fn bootstrap_inner(&mut self) -> Result<()> {
        let response = self
            .transport
            .send(PortalRequest::get(self.url(LOGIN_PAGE_PATH)))
            .await?;

        let cookie = cookie_value(&response.set_cookies, SESSION_COOKIE).ok_or_else(|| {
            Error::Protocol("login page did not issue a session cookie".to_string())
        })?;
        let session_id = ScriptVars::session_id(&response.body)
            .ok_or_else(|| Error::Protocol("login page has no _sessionid".to_string()))?;

        tracing::debug!("session bootstrapped, internal session id {}", session_id);
        self.context.set_session_cookie(cookie)?;
        self.context.set_internal_session_id(session_id)
    }

    /// 获取动态加密参数 `_deskey` 与服务器时间 `_nowtime`
    pub async fn discover_params(&mut self) -> Result<()> {
        self.expect_state(&AuthState::CookieBootstrapped, "discover_params")?;
        let result = self.discover_params_inner().await;
        self.finish_step(result, AuthState::ParamsDiscovered)
    }

    async fn discover_params_inner(&mut self) -> Result<()> {
        let cookie = self
            .context
            .session_cookie()
            .ok_or_else(|| Error::Protocol("session cookie missing".to_string()))?
            .to_string();
        let response = self
            .transport
            .send(PortalRequest::get(self.url(ENCRYPT_PARAMS_PATH)).with_session(&cookie))
            .await?;

        let key = ScriptVars::cipher_key(&response.body)
            .ok_or_else(|| Error::Protocol("encryption script has no _deskey".to_string()))?;
        let timestamp = ScriptVars::server_timestamp(&response.body)
            .ok_or_else(|| Error::Protocol("encryption script has no _nowtime".to_string()))?;

        tracing::debug!("encryption params discovered, server time {}", timestamp);
        self.context.set_cipher_key(key)?;
        self.context.set_server_timestamp(timestamp)
    }

    /// 用已发现的参数加密凭据，生成登录请求正文
    pub fn encrypt_credentials(&mut self, credentials: &Credentials) -> Result<&str> {
        self.expect_state(&AuthState::ParamsDiscovered, "encrypt_credentials")?;
        let result = self.context.ensure_complete().and_then(|()| {
            build_login_payload(
                self.cipher,
                credentials.student_id(),
                credentials.password_digest(),
                self.context.server_timestamp().unwrap_or_default(),
                self.context.cipher_key().unwrap_or_default(),
                self.context.internal_session_id().unwrap_or_default(),
            )
        });

        match result {
            Ok(payload) => {
                self.state = AuthState::CredentialsEncrypted;
                Ok(self.payload.insert(payload).as_str())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// 提交登录，成功时返回轮换后的 JSESSIONID
    pub async fn submit_login(&mut self) -> Result<String> {
        self.expect_state(&AuthState::CredentialsEncrypted, "submit_login")?;
        let result = self.submit_login_inner().await;
        self.finish_step(result, AuthState::SessionRenewed)?;
        self.renewed_cookie
            .clone()
            .ok_or_else(|| Error::Protocol("renewed session cookie missing".to_string()))
    }

    async fn submit_login_inner(&mut self) -> Result<()> {
        let cookie = self
            .context
            .session_cookie()
            .ok_or_else(|| Error::Protocol("session cookie missing".to_string()))?
            .to_string();
        let payload = self
            .payload
            .clone()
            .ok_or_else(|| Error::Protocol("login payload missing".to_string()))?;

        let request = PortalRequest::post_form(self.url(LOGIN_SUBMIT_PATH), payload)
            .with_session(&cookie)
            .with_referer(self.url(LOGIN_PAGE_PATH));
        let response = self.transport.send(request).await?;

        let json: Value = serde_json::from_str(&response.body)
            .map_err(|e| Error::Protocol(format!("login response is not JSON: {e}")))?;
        let status = match &json["status"] {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return Err(Error::Protocol("login response has no status".to_string())),
        };
        if status != "200" {
            let message = json["message"]
                .as_str()
                .filter(|m| !m.is_empty())
                .unwrap_or("unknown reason")
                .to_string();
            return Err(Error::LoginFailed(message));
        }
        self.state = AuthState::LoggedIn;

        let renewed = cookie_value(&response.set_cookies, SESSION_COOKIE).ok_or_else(|| {
            Error::Protocol("login succeeded but no new session cookie was issued".to_string())
        })?;
        self.renewed_cookie = Some(renewed);
        Ok(())
    }

    fn finish_step(&mut self, result: Result<()>, next: AuthState) -> Result<()> {
        match result {
            Ok(()) => {
                self.state = next;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// 完整执行握手，返回登录后的 JSESSIONID
    pub async fn login(&mut self, credentials: &Credentials) -> Result<String> {
        self.bootstrap().await?;
        self.discover_params().await?;
        self.encrypt_credentials(credentials)?;
        let cookie = self.submit_login().await?;
        tracing::info!("Logged in as {}", credentials.student_id());
        Ok(cookie)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cipher::KingoDes,
        portal::{testing::ScriptedTransport, transport::Method},
    };

    const BASE: &str = "http://jw.example.edu";
    const LOGIN_PAGE: &str = r#"<html><script>var _sessionid = "0A1B2C3D";</script></html>"#;
    const PARAMS_JS: &str = "var _deskey = 'deskey123';\nvar _nowtime = '2025-10-26 00:17:41';";

    struct EchoCipher;

    impl Cipher for EchoCipher {
        fn encrypt(&self, plaintext: &str, key: &str) -> Result<String> {
            Ok(format!("{key}:{}", plaintext.len()))
        }
    }

    fn credentials() -> Credentials {
        Credentials::new("202312345678", "e10adc3949ba59abbe56e057f20f883e").unwrap()
    }

    #[test]
    fn payload_layout() {
        let payload = build_login_payload(
            &EchoCipher,
            "202312345678",
            "e10adc3949ba59abbe56e057f20f883e",
            "2025-10-26 00:17:41",
            "deskey123",
            "1A2B",
        )
        .unwrap();

        let fields: Vec<&str> = payload.split('&').map(|f| f.split('=').next().unwrap()).collect();
        assert_eq!(fields, ["params", "token", "timestamp", "deskey", "ssessionid"]);
        assert!(payload.contains("&timestamp=2025-10-26 00:17:41&"));
        assert!(payload.ends_with("&deskey=deskey123&ssessionid=1A2B"));

        let intermediate = format!(
            "_u=MjAyMzEyMzQ1Njc4OzsxQTJC&_p={}{POLICY_FLAGS}",
            md5_hex("e10adc3949ba59abbe56e057f20f883ed41d8cd98f00b204e9800998ecf8427e")
        );
        let token = md5_hex(&format!(
            "{}{}",
            md5_hex(&intermediate),
            md5_hex("2025-10-26 00:17:41")
        ));
        assert!(payload.contains(&format!("&token={token}&")));
        let params = base64_encode(&format!("deskey123:{}", intermediate.len()));
        assert!(payload.starts_with(&format!("params={params}&")));
    }

    #[test]
    fn payload_is_deterministic_with_real_cipher() {
        let build = || {
            build_login_payload(&KingoDes, "202312345678", "abc", "ts", "key", "1A2B").unwrap()
        };
        assert_eq!(build(), build());
    }

    #[tokio::test]
    async fn full_handshake() {
        let transport = ScriptedTransport::new()
            .respond(LOGIN_PAGE, &["JSESSIONID=FIRST; Path=/"])
            .respond(PARAMS_JS, &[])
            .respond(
                r#"{"status":"200","message":"ok"}"#,
                &["JSESSIONID=ROTATED; Path=/; HttpOnly"],
            );
        let mut session = AuthSession::new(&transport, &KingoDes, BASE);

        let cookie = session.login(&credentials()).await.unwrap();
        assert_eq!(cookie, "ROTATED");
        assert_eq!(session.state(), &AuthState::SessionRenewed);
        assert!(session.context().is_complete());

        let params_req = transport.request(1);
        assert_eq!(params_req.url, format!("{BASE}/custom/js/SetKingoEncypt.jsp"));
        assert_eq!(params_req.session_cookie.as_deref(), Some("FIRST"));

        let login_req = transport.request(2);
        assert_eq!(login_req.method, Method::Post);
        assert_eq!(login_req.url, format!("{BASE}/cas/logon.action"));
        assert_eq!(login_req.referer, Some(format!("{BASE}/cas/login.action")));
        assert!(login_req.form_body.unwrap().contains("&ssessionid=0A1B2C3D"));
    }

    #[tokio::test]
    async fn missing_session_id_is_protocol_error() {
        let transport =
            ScriptedTransport::new().respond("<html></html>", &["JSESSIONID=FIRST; Path=/"]);
        let mut session = AuthSession::new(&transport, &KingoDes, BASE);

        let err = session.bootstrap().await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(matches!(session.state(), AuthState::Failed(_)));
    }

    #[tokio::test]
    async fn missing_cookie_is_protocol_error() {
        let transport = ScriptedTransport::new().respond(LOGIN_PAGE, &[]);
        let mut session = AuthSession::new(&transport, &KingoDes, BASE);
        assert!(matches!(session.bootstrap().await, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn network_failure_is_not_retried() {
        let transport = ScriptedTransport::new().fail("connection reset");
        let mut session = AuthSession::new(&transport, &KingoDes, BASE);

        assert!(matches!(session.login(&credentials()).await, Err(Error::Network(_))));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn out_of_order_call_fails_session() {
        let transport = ScriptedTransport::new();
        let mut session = AuthSession::new(&transport, &KingoDes, BASE);

        assert!(matches!(session.discover_params().await, Err(Error::Protocol(_))));
        assert!(matches!(session.state(), AuthState::Failed(_)));
        // 失败后不可继续
        assert!(session.bootstrap().await.is_err());
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn login_rejection_carries_portal_message() {
        let transport = ScriptedTransport::new()
            .respond(LOGIN_PAGE, &["JSESSIONID=FIRST"])
            .respond(PARAMS_JS, &[])
            .respond(r#"{"status":"401","message":"用户名或密码错误"}"#, &[]);
        let mut session = AuthSession::new(&transport, &KingoDes, BASE);

        match session.login(&credentials()).await {
            Err(Error::LoginFailed(message)) => assert_eq!(message, "用户名或密码错误"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn success_without_rotated_cookie_is_protocol_error() {
        let transport = ScriptedTransport::new()
            .respond(LOGIN_PAGE, &["JSESSIONID=FIRST"])
            .respond(PARAMS_JS, &[])
            .respond(r#"{"status":"200"}"#, &[]);
        let mut session = AuthSession::new(&transport, &KingoDes, BASE);

        assert!(matches!(session.login(&credentials()).await, Err(Error::Protocol(_))));
        assert!(matches!(session.state(), AuthState::Failed(_)));
    }
}
