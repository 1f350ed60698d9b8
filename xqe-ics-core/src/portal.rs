//! 教务系统（喜鹊儿/青果）交互：登录握手与课表抓取。

pub mod auth;
pub mod extract;
pub mod fetcher;
pub mod transport;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};

pub use auth::{AuthSession, AuthState, build_login_payload};
pub use extract::ScriptVars;
pub use fetcher::ScheduleFetcher;
pub use transport::{HttpTransport, Method, PortalRequest, PortalResponse, Transport};

/// 会话 Cookie 名称
pub const SESSION_COOKIE: &str = "JSESSIONID";

pub(crate) const LOGIN_PAGE_PATH: &str = "/cas/login.action";
pub(crate) const ENCRYPT_PARAMS_PATH: &str = "/custom/js/SetKingoEncypt.jsp";
pub(crate) const LOGIN_SUBMIT_PATH: &str = "/cas/logon.action";
pub(crate) const TERM_CONTEXT_PATH: &str = "/jw/common/showYearTerm.action";
pub(crate) const TIMETABLE_PATH: &str = "/student/wsxk.xskcb10319.jsp";
pub(crate) const TIMETABLE_REFERER_PATH: &str = "/student/xkjg.wdkb.jsp?menucode=S20301";

pub(crate) fn md5_hex(data: &str) -> String {
    format!("{:x}", md5::compute(data.as_bytes()))
}

pub(crate) fn base64_encode(data: &str) -> String {
    BASE64_STANDARD.encode(data.as_bytes())
}
