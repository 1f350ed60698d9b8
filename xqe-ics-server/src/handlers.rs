use std::sync::{Arc, LazyLock};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use xqe_ics_core::{
    Credentials, IcsOptions, ReminderPolicy,
    pipeline::{CalendarRequest, Pipeline},
};

const DEFAULT_REMIND_MINUTES: i64 = 30;

static STUDENT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{12}$").expect("static regex is valid"));
static PASSWORD_MD5: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-f]{32}$").expect("static regex is valid"));

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

/// 健康检查响应
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// 错误响应
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

/// 日历订阅请求参数
#[derive(Debug, Default, Deserialize)]
struct CalendarQuery {
    /// 密码的 MD5（32位十六进制）
    pwd: Option<String>,
    base_url: Option<String>,
    /// 提前提醒分钟数，-1 关闭，0 为上课时
    remind: Option<i64>,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/{file}", get(calendar_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// 根路径处理器
async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "XQE ICS Calendar Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "XiQueEr timetable to ICS subscription service",
        "usage": "/{student_id}.ics?pwd={md5(password)}&base_url={portal}&remind={minutes}",
        "endpoints": {
            "health": "/health",
            "calendar": "/{student_id}.ics"
        },
        "remind": {
            "default": DEFAULT_REMIND_MINUTES,
            "-1": "no reminder",
            "0": "remind at class start"
        }
    }))
}

/// 健康检查处理器
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// 校验路径与查询参数，组装生成请求
fn build_request(file: &str, query: CalendarQuery) -> Result<CalendarRequest, AppError> {
    let student_id = file
        .strip_suffix(".ics")
        .ok_or_else(|| AppError::not_found(file))?;
    if !STUDENT_ID.is_match(student_id) {
        return Err(invalid("学号必须为12位数字"));
    }

    let pwd = query
        .pwd
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| invalid("缺少 pwd 参数"))?;
    if !PASSWORD_MD5.is_match(&pwd) {
        return Err(invalid("pwd 必须为32位MD5值"));
    }

    let reminder = ReminderPolicy::from_minutes(query.remind.unwrap_or(DEFAULT_REMIND_MINUTES))?;

    Ok(CalendarRequest {
        credentials: Credentials::new(student_id, &pwd)?,
        base_url: query.base_url,
        options: IcsOptions {
            calendar_name: format!("课程表-{student_id}"),
            reminder,
            ..Default::default()
        },
    })
}

fn invalid(message: &str) -> AppError {
    AppError::Core(xqe_ics_core::Error::Validation(message.to_string()))
}

/// 日历订阅处理器
async fn calendar_handler(
    Path(file): Path<String>,
    Query(query): Query<CalendarQuery>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let request = build_request(&file, query)?;
    let student_id = request.credentials.student_id().to_string();

    let ics_content = state.pipeline.generate(&request).await?;
    tracing::info!("Served calendar for {}", student_id);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={student_id}.ics"),
            ),
        ],
        ics_content,
    )
        .into_response())
}

/// 应用错误类型
#[derive(Debug)]
enum AppError {
    NotFound(String),
    Core(xqe_ics_core::Error),
}

impl AppError {
    fn not_found(path: &str) -> Self {
        Self::NotFound(path.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, message) = match &self {
            Self::NotFound(path) => (StatusCode::NOT_FOUND, "未找到", format!("/{path}")),
            Self::Core(xqe_ics_core::Error::Validation(m)) => {
                (StatusCode::BAD_REQUEST, "参数错误", m.clone())
            }
            Self::Core(xqe_ics_core::Error::LoginFailed(m)) => {
                tracing::warn!("Portal rejected login: {}", m);
                (StatusCode::INTERNAL_SERVER_ERROR, "登录失败", m.clone())
            }
            Self::Core(e) => {
                tracing::error!("Calendar generation failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部服务器错误",
                    "课表获取或生成失败，请稍后重试".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_message.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<xqe_ics_core::Error>,
{
    fn from(err: E) -> Self {
        Self::Core(err.into())
    }
}
