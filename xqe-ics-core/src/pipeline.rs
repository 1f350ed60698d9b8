//! 登录 → 抓取 → 解析 → 生成 的顺序编排，任一阶段失败即返回。

use std::sync::Arc;

use crate::{
    CourseRecord, Credentials, IcsOptions, Result,
    cipher::{Cipher, KingoDes},
    config::{PortalConfig, TimetableConfig},
    ics::CalendarSynthesizer,
    parser::parse_schedule,
    portal::{AuthSession, HttpTransport, ScheduleFetcher, Transport},
};

/// 单次日历生成请求
#[derive(Debug, Clone)]
pub struct CalendarRequest {
    pub credentials: Credentials,
    /// 覆盖默认的教务系统地址
    pub base_url: Option<String>,
    pub options: IcsOptions,
}

/// 进程内共享的流水线，请求之间只共享只读配置和传输层
#[derive(Clone)]
pub struct Pipeline {
    transport: Arc<dyn Transport>,
    cipher: Arc<dyn Cipher>,
    timetable: Arc<TimetableConfig>,
    default_base_url: String,
}

impl Pipeline {
    pub fn new(
        transport: Arc<dyn Transport>,
        cipher: Arc<dyn Cipher>,
        timetable: Arc<TimetableConfig>,
        default_base_url: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            cipher,
            timetable,
            default_base_url: default_base_url.into(),
        }
    }

    /// 使用 reqwest 传输层与原生 DES 实现
    pub fn with_http(portal: &PortalConfig, timetable: Arc<TimetableConfig>) -> Result<Self> {
        let transport = HttpTransport::new(portal.timeout_secs)?;
        Ok(Self::new(
            Arc::new(transport),
            Arc::new(KingoDes::new()),
            timetable,
            portal.base_url.clone(),
        ))
    }

    pub fn timetable(&self) -> &TimetableConfig {
        &self.timetable
    }

    pub fn default_base_url(&self) -> &str {
        &self.default_base_url
    }

    /// 登录并抓取课表，返回解析后的课程记录
    pub async fn fetch_courses(
        &self,
        base_url: Option<&str>,
        credentials: &Credentials,
    ) -> Result<Vec<CourseRecord>> {
        let base_url = base_url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(&self.default_base_url);
        tracing::info!("Fetching timetable of {} from {}", credentials.student_id(), base_url);

        let mut session = AuthSession::new(self.transport.as_ref(), self.cipher.as_ref(), base_url);
        let cookie = session.login(credentials).await?;

        let fetcher = ScheduleFetcher::new(self.transport.as_ref(), base_url);
        let identity = fetcher.resolve_term_context(&cookie).await?;
        let document = fetcher.fetch_timetable_document(&identity).await?;

        parse_schedule(&document)
    }

    /// 完整流程，返回 ICS 文本
    pub async fn generate(&self, request: &CalendarRequest) -> Result<String> {
        let courses = self
            .fetch_courses(request.base_url.as_deref(), &request.credentials)
            .await?;

        let synthesizer = CalendarSynthesizer::new(&self.timetable, request.options.clone());
        synthesizer.generate(&courses)
    }
}
