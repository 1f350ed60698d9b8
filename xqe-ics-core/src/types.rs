use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// 用户凭据
///
/// 密码只以一次 MD5 后的摘要形式出现，核心库从不接触明文。
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    student_id: String,
    password_digest: String,
}

impl Credentials {
    /// 校验并构造凭据，摘要统一转为小写
    pub fn new(student_id: impl Into<String>, password_digest: impl AsRef<str>) -> Result<Self> {
        let student_id = student_id.into();
        if student_id.is_empty() || !student_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::Validation(format!(
                "student id must be numeric, got '{student_id}'"
            )));
        }

        let password_digest = password_digest.as_ref().trim().to_ascii_lowercase();
        if password_digest.len() != 32 || !password_digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::Validation(
                "password must be a 32-character hex MD5 digest".to_string(),
            ));
        }

        Ok(Self {
            student_id,
            password_digest,
        })
    }

    pub fn student_id(&self) -> &str {
        &self.student_id
    }

    pub fn password_digest(&self) -> &str {
        &self.password_digest
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("student_id", &self.student_id)
            .field("password_digest", &"<redacted>")
            .finish()
    }
}

/// 登录握手过程中逐步填充的会话上下文
///
/// 四个字段分别来自不同的往返请求，每个字段在一次尝试中只能写入一次。
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    session_cookie: Option<String>,
    internal_session_id: Option<String>,
    cipher_key: Option<String>,
    server_timestamp: Option<String>,
}

fn write_once(slot: &mut Option<String>, value: String, field: &str) -> Result<()> {
    if slot.is_some() {
        return Err(Error::Protocol(format!(
            "session field '{field}' was already set in this attempt"
        )));
    }
    if value.is_empty() {
        return Err(Error::Protocol(format!("session field '{field}' is empty")));
    }
    *slot = Some(value);
    Ok(())
}

impl SessionContext {
    pub fn set_session_cookie(&mut self, value: String) -> Result<()> {
        write_once(&mut self.session_cookie, value, "session_cookie")
    }

    pub fn set_internal_session_id(&mut self, value: String) -> Result<()> {
        write_once(&mut self.internal_session_id, value, "internal_session_id")
    }

    pub fn set_cipher_key(&mut self, value: String) -> Result<()> {
        write_once(&mut self.cipher_key, value, "cipher_key")
    }

    pub fn set_server_timestamp(&mut self, value: String) -> Result<()> {
        write_once(&mut self.server_timestamp, value, "server_timestamp")
    }

    pub fn session_cookie(&self) -> Option<&str> {
        self.session_cookie.as_deref()
    }

    pub fn internal_session_id(&self) -> Option<&str> {
        self.internal_session_id.as_deref()
    }

    pub fn cipher_key(&self) -> Option<&str> {
        self.cipher_key.as_deref()
    }

    pub fn server_timestamp(&self) -> Option<&str> {
        self.server_timestamp.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.session_cookie.is_some()
            && self.internal_session_id.is_some()
            && self.cipher_key.is_some()
            && self.server_timestamp.is_some()
    }

    /// 确保四个字段都已就绪，部分填充的上下文直接视为协议错误
    pub fn ensure_complete(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("session_cookie", self.session_cookie.is_none()),
            ("internal_session_id", self.internal_session_id.is_none()),
            ("cipher_key", self.cipher_key.is_none()),
            ("server_timestamp", self.server_timestamp.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, missing)| missing.then_some(name))
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Protocol(format!(
                "session context incomplete, missing: {}",
                missing.join(", ")
            )))
        }
    }
}

/// 登录成功并取得学年学期后的身份信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedIdentity {
    /// 登录后轮换得到的 JSESSIONID
    pub session_cookie: String,
    /// 学年，如 "2025"
    pub school_year: String,
    /// 学期代码
    pub term: String,
    /// 教务系统内部的用户代码
    pub user_code: String,
}

/// 一条按周重复的课程记录（课表中的一个课程块）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRecord {
    /// 星期几，1=周一，7=周日
    pub weekday: u32,
    pub title: String,
    pub teacher: String,
    /// 原始教学周字符串，如 "1-16单"
    pub teaching_weeks: String,
    /// 原始节次字符串，如 "3-4"
    pub class_periods: String,
    pub location: String,
}

/// 课程在某一周的一次具体上课
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarOccurrence {
    pub title: String,
    pub teacher: String,
    pub weeks_raw: String,
    pub periods_raw: String,
    pub location: String,
    /// 本地时间（由 TZID 限定）
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub uid: String,
}

/// 课前提醒策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReminderPolicy {
    Disabled,
    AtStart,
    MinutesBefore(u32),
}

impl ReminderPolicy {
    /// 从请求中的分钟数构造：-1 关闭，0 为开始时提醒
    pub fn from_minutes(minutes: i64) -> Result<Self> {
        match minutes {
            -1 => Ok(Self::Disabled),
            0 => Ok(Self::AtStart),
            m if m > 0 => u32::try_from(m)
                .map(Self::MinutesBefore)
                .map_err(|_| Error::Validation(format!("reminder minutes too large: {m}"))),
            m => Err(Error::Validation(format!(
                "reminder minutes must be -1, 0 or positive, got {m}"
            ))),
        }
    }

    /// 提醒提前的分钟数，关闭时为 None
    pub fn minutes(self) -> Option<u32> {
        match self {
            Self::Disabled => None,
            Self::AtStart => Some(0),
            Self::MinutesBefore(m) => Some(m),
        }
    }
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self::MinutesBefore(30)
    }
}

/// ICS生成选项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IcsOptions {
    /// 日历名称
    pub calendar_name: String,
    pub reminder: ReminderPolicy,
    /// 写入 DTSTAMP 的生成时间
    pub generated_at: DateTime<Utc>,
}

impl Default for IcsOptions {
    fn default() -> Self {
        Self {
            calendar_name: "课程表".to_string(),
            reminder: ReminderPolicy::default(),
            generated_at: Utc::now(),
        }
    }
}
