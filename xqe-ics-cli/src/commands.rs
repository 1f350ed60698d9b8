use std::{fs, sync::Arc};

use anyhow::{Context, Result};
use chrono::Local;
use xqe_ics_core::{
    config::{PortalConfig, TimetableConfig},
    prelude::*,
};

/// 生成课程表命令参数
pub struct GenerateParams {
    pub username: String,
    pub password_md5: String,
    pub base_url: Option<String>,
    pub timetable: String,
    pub reminder: i64,
    pub output: Option<String>,
}

/// 明文密码的MD5摘要，与教务系统前端一致
pub fn password_digest(password: &str) -> String {
    format!("{:x}", md5::compute(password.as_bytes()))
}

fn load_timetable(path: &str) -> Result<TimetableConfig> {
    let timetable =
        TimetableConfig::from_path(path).with_context(|| format!("加载节次时间表失败: {path}"))?;
    tracing::debug!(
        "Loaded {} periods from {}, first monday {}",
        timetable.periods.len(),
        path,
        timetable.first_monday
    );
    Ok(timetable)
}

fn ics_options(calendar_name: String, reminder: i64) -> Result<IcsOptions> {
    Ok(IcsOptions {
        calendar_name,
        reminder: ReminderPolicy::from_minutes(reminder)?,
        ..Default::default()
    })
}

/// 生成课程表命令
pub async fn generate_command(params: GenerateParams) -> Result<()> {
    let credentials = Credentials::new(params.username.as_str(), &params.password_md5)?;
    let timetable = Arc::new(load_timetable(&params.timetable)?);

    let portal = params
        .base_url
        .as_deref()
        .map(PortalConfig::new)
        .unwrap_or_default();
    tracing::info!(
        "开始生成课程表: 用户={}, 教务系统={}",
        params.username,
        portal.base_url
    );

    let pipeline = Pipeline::with_http(&portal, timetable)?;
    let request = CalendarRequest {
        credentials,
        base_url: None,
        options: ics_options(format!("{}的课程表", params.username), params.reminder)?,
    };

    println!("登录教务系统并获取课程表...");
    let ics_content = pipeline.generate(&request).await?;
    println!(
        "✓ 共生成 {} 个上课事件",
        ics_content.matches("BEGIN:VEVENT").count()
    );

    // 确定输出文件名
    let output_file = params.output.unwrap_or_else(|| {
        format!(
            "xqe-schedule-{}-{}.ics",
            params.username,
            Local::now().format("%Y%m%d")
        )
    });

    // 写入文件
    fs::write(&output_file, ics_content)?;
    println!("✓ ICS文件已保存到: {}", output_file);

    Ok(())
}

/// 解析课表页面命令
pub fn parse_command(html: &str, output: Option<&str>) -> Result<()> {
    let markup = fs::read_to_string(html).with_context(|| format!("读取课表页面失败: {html}"))?;
    let courses = parse_schedule(&markup)?;
    let json = serde_json::to_string_pretty(&courses)?;

    match output {
        Some(path) => {
            fs::write(path, json)?;
            println!("✓ {} 条课程记录已保存到: {}", courses.len(), path);
        }
        None => println!("{json}"),
    }

    Ok(())
}

/// 由课程JSON生成ICS命令
pub fn render_command(courses: &str, timetable: &str, reminder: i64, output: &str) -> Result<()> {
    let content =
        fs::read_to_string(courses).with_context(|| format!("读取课程JSON失败: {courses}"))?;
    let records: Vec<CourseRecord> = serde_json::from_str(&content)?;
    let timetable = load_timetable(timetable)?;

    let synthesizer = CalendarSynthesizer::new(&timetable, ics_options("课程表".to_string(), reminder)?);
    let ics_content = synthesizer.generate(&records)?;

    fs::write(output, ics_content)?;
    println!("✓ {} 条课程记录已生成到: {}", records.len(), output);

    Ok(())
}

/// 显示节次时间表命令
pub fn periods_command(timetable: &str) -> Result<()> {
    let timetable = load_timetable(timetable)?;

    println!("第一周周一: {}", timetable.first_monday);
    println!("节次时间表:");
    for (period, range) in timetable.periods.iter() {
        println!("  第{}节 {}", period, range);
    }

    Ok(())
}
