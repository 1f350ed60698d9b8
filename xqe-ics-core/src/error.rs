use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// 调用方输入不合法（学号、密码摘要、提醒时间等）
    #[error("Invalid input: {0}")]
    Validation(String),

    /// 传输层失败，包括超时
    #[error("Network error: {0}")]
    Network(String),

    /// 教务系统的响应不符合握手约定
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// 教务系统返回的登录失败信息，原样展示给用户
    #[error("登录失败: {0}")]
    LoginFailed(String),

    /// 课表页面结构无法解析
    #[error("Markup parsing failed: {0}")]
    Parse(String),

    /// 课程记录与节次表等数据不一致
    #[error("Inconsistent course data: {0}")]
    Data(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Date/time parsing failed: {0}")]
    DateTime(#[from] chrono::ParseError),
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Network(format!("request timed out: {error}"))
        } else {
            Self::Network(error.to_string())
        }
    }
}

impl Error {
    /// 是否可以直接展示给终端用户
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::LoginFailed(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
