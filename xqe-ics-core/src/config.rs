//! 进程级只读配置：节次时间表、学期第一周周一、教务系统地址。
//!
//! 启动时构造一次，之后以 `Arc` 共享给每次请求，不再修改。

use std::{collections::BTreeMap, collections::HashMap, fmt, path::Path};

use chrono::{Datelike, Duration, NaiveDate, NaiveTime};

use crate::{Error, Result};

/// 未在时间表文件中给出时使用的开学日期
pub const DEFAULT_FIRST_MONDAY: &str = "2025-09-01";
pub const DEFAULT_PORTAL_BASE_URL: &str = "http://202.103.141.242";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const FIRST_MONDAY_KEY: &str = "first_monday";

/// 一节课的起止时间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl ClockRange {
    /// 解析 "HH:MM-HH:MM"
    pub fn parse(value: &str) -> Result<Self> {
        let (start, end) = value
            .split_once('-')
            .ok_or_else(|| Error::Config(format!("invalid period time range '{value}'")))?;
        let start = NaiveTime::parse_from_str(start.trim(), "%H:%M")?;
        let end = NaiveTime::parse_from_str(end.trim(), "%H:%M")?;
        if start >= end {
            return Err(Error::Config(format!(
                "period time range '{value}' does not end after it starts"
            )));
        }
        Ok(Self { start, end })
    }
}

impl fmt::Display for ClockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// 节次号到上课时间的映射
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeriodTable {
    slots: BTreeMap<u32, ClockRange>,
}

impl PeriodTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, period: u32, range: ClockRange) {
        self.slots.insert(period, range);
    }

    pub fn get(&self, period: u32) -> Option<&ClockRange> {
        self.slots.get(&period)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &ClockRange)> {
        self.slots.iter().map(|(&p, r)| (p, r))
    }
}

impl<'a> TryFrom<&'a [(&'a str, &'a str)]> for PeriodTable {
    type Error = Error;

    fn try_from(entries: &'a [(&'a str, &'a str)]) -> Result<Self> {
        let mut table = Self::new();
        for (period, range) in entries {
            table.insert(parse_period_key(period)?, ClockRange::parse(range)?);
        }
        Ok(table)
    }
}

fn parse_period_key(key: &str) -> Result<u32> {
    match key.trim().parse::<u32>() {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(Error::Config(format!("invalid period number '{key}'"))),
    }
}

/// 将任意日期归一到所在周的周一
pub fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// 课表生成所需的全部静态配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimetableConfig {
    pub periods: PeriodTable,
    /// 第一教学周的周一
    pub first_monday: NaiveDate,
}

impl TimetableConfig {
    pub fn new(periods: PeriodTable, first_day: NaiveDate) -> Self {
        Self {
            periods,
            first_monday: monday_of(first_day),
        }
    }

    /// 解析时间表 JSON：
    /// `{"1": "08:00-08:45", ..., "first_monday": "2025-09-01"}`
    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: HashMap<String, String> = serde_json::from_str(content)?;

        let first_day = raw
            .get(FIRST_MONDAY_KEY)
            .map_or(DEFAULT_FIRST_MONDAY, String::as_str);
        let first_day = NaiveDate::parse_from_str(first_day.trim(), "%Y-%m-%d").map_err(|e| {
            Error::Config(format!(
                "invalid {FIRST_MONDAY_KEY} '{first_day}': {e}, expected YYYY-MM-DD"
            ))
        })?;

        let mut periods = PeriodTable::new();
        for (key, value) in raw.iter().filter(|(k, _)| k.as_str() != FIRST_MONDAY_KEY) {
            let range = ClockRange::parse(value)
                .map_err(|e| Error::Config(format!("period '{key}': {e}")))?;
            periods.insert(parse_period_key(key)?, range);
        }

        if periods.is_empty() {
            return Err(Error::Config("timetable defines no periods".to_string()));
        }

        let config = Self::new(periods, first_day);
        if config.first_monday != first_day {
            tracing::warn!(
                "{} {} is not a Monday, using {}",
                FIRST_MONDAY_KEY,
                first_day,
                config.first_monday
            );
        }
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("无法读取timetable文件 {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }
}

/// 教务系统连接参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl PortalConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PORTAL_BASE_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_timetable_json() {
        let config = TimetableConfig::from_json_str(
            r#"{"1": "08:00-08:45", "2": "08:55-09:40", "first_monday": "2025-09-01"}"#,
        )
        .unwrap();
        assert_eq!(config.periods.len(), 2);
        assert_eq!(config.first_monday, NaiveDate::from_ymd_opt(2025, 9, 1).unwrap());
        assert_eq!(config.periods.get(2).unwrap().to_string(), "08:55-09:40");
    }

    #[test]
    fn first_monday_defaults_and_normalizes() {
        let config = TimetableConfig::from_json_str(r#"{"1": "08:00-08:45"}"#).unwrap();
        assert_eq!(config.first_monday, NaiveDate::from_ymd_opt(2025, 9, 1).unwrap());

        // 2025-09-03 是周三
        let config = TimetableConfig::from_json_str(
            r#"{"1": "08:00-08:45", "first_monday": "2025-09-03"}"#,
        )
        .unwrap();
        assert_eq!(config.first_monday, NaiveDate::from_ymd_opt(2025, 9, 1).unwrap());
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!(matches!(
            TimetableConfig::from_json_str(r#"{"x": "08:00-08:45"}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            TimetableConfig::from_json_str(r#"{"1": "08:45-08:00"}"#),
            Err(Error::Config(_))
        ));
        assert!(TimetableConfig::from_json_str(r#"{"first_monday": "2025-09-01"}"#).is_err());
    }

    #[test]
    fn portal_base_url_trimmed() {
        assert_eq!(PortalConfig::new("http://jw.example.edu/").base_url, "http://jw.example.edu");
    }
}
