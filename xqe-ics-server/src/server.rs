use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use xqe_ics_core::{
    config::{DEFAULT_PORTAL_BASE_URL, DEFAULT_TIMEOUT_SECS, PortalConfig, TimetableConfig},
    pipeline::Pipeline,
};

use crate::handlers::{AppState, create_app};

/// 读取非空环境变量
fn env_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn load_state() -> Result<AppState> {
    let timetable_path = env_var("TIMETABLE_PATH").unwrap_or_else(|| "timetable.json".to_string());
    let timetable = TimetableConfig::from_path(&timetable_path)
        .with_context(|| format!("failed to load timetable from {timetable_path}"))?;
    tracing::info!(
        "Loaded {} periods from {}, first monday {}",
        timetable.periods.len(),
        timetable_path,
        timetable.first_monday
    );

    let base_url = env_var("PORTAL_BASE_URL").unwrap_or_else(|| DEFAULT_PORTAL_BASE_URL.to_string());
    let timeout_secs = match env_var("PORTAL_TIMEOUT") {
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("PORTAL_TIMEOUT must be a number of seconds, got {raw}"))?,
        None => DEFAULT_TIMEOUT_SECS,
    };
    let portal = PortalConfig {
        timeout_secs,
        ..PortalConfig::new(base_url)
    };

    let pipeline = Pipeline::with_http(&portal, Arc::new(timetable))?;
    Ok(AppState {
        pipeline: Arc::new(pipeline),
    })
}

pub async fn start_server() -> Result<()> {
    let app = create_app(load_state()?);

    // 从环境变量获取端口，默认为3000
    let port = env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse::<u16>()
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!("XQE ICS Server starting on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
