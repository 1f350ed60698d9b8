use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};

use crate::{
    CalendarOccurrence, CourseRecord, Error, IcsOptions, ReminderPolicy, Result,
    config::TimetableConfig,
    ranges::{parse_periods, parse_weeks},
};

#[cfg(test)]
mod tests;

pub const TIMEZONE: &str = "Asia/Shanghai";
const PRODUCT_ID: &str = "-//XQE ICS//Course Schedule Generator//CN";
const MAX_LINE_OCTETS: usize = 75;
const LOCAL_FORMAT: &str = "%Y%m%dT%H%M%S";

/// 第 `week` 周星期 `weekday` 的日期，周次与星期都从 1 开始
pub fn occurrence_date(first_monday: NaiveDate, week: u32, weekday: u32) -> Result<NaiveDate> {
    let offset = u64::from(week.saturating_sub(1)) * 7 + u64::from(weekday.saturating_sub(1));
    first_monday
        .checked_add_days(Days::new(offset))
        .ok_or_else(|| {
            Error::Data(format!(
                "week {week} weekday {weekday} is out of the supported date range"
            ))
        })
}

/// `<课程名>_<周次>_<星期>_<开始时间>@courses`
pub fn occurrence_uid(title: &str, week: u32, weekday: u32, start: NaiveTime) -> String {
    format!("{}_{}_{}_{}@courses", title, week, weekday, start.format("%H:%M"))
}

/// 课程记录 → 每周上课实例 → ICS 文档
pub struct CalendarSynthesizer<'a> {
    config: &'a TimetableConfig,
    options: IcsOptions,
}

impl<'a> CalendarSynthesizer<'a> {
    pub fn new(config: &'a TimetableConfig, options: IcsOptions) -> Self {
        Self { config, options }
    }

    /// 连续的最小节开始到最大节结束，节次缺失于时间表时报错
    fn time_span(&self, record: &CourseRecord, periods: &[u32]) -> Result<(NaiveTime, NaiveTime)> {
        let lookup = |period: u32| {
            self.config.periods.get(period).ok_or_else(|| {
                Error::Data(format!(
                    "period {period} of '{}' is not in the period table",
                    record.title
                ))
            })
        };
        let (Some(&first), Some(&last)) = (periods.first(), periods.last()) else {
            return Err(Error::Data(format!("'{}' has no periods", record.title)));
        };
        for &period in periods {
            lookup(period)?;
        }

        let start = lookup(first)?.start;
        let end = lookup(last)?.end;
        if start >= end {
            return Err(Error::Data(format!(
                "'{}' periods {} resolve to an empty time span",
                record.title, record.class_periods
            )));
        }
        Ok((start, end))
    }

    /// 展开单条课程记录
    pub fn occurrences(&self, record: &CourseRecord) -> Result<Vec<CalendarOccurrence>> {
        if !(1..=7).contains(&record.weekday) {
            return Err(Error::Data(format!(
                "'{}' has weekday {} outside 1-7",
                record.title, record.weekday
            )));
        }

        let weeks = parse_weeks(&record.teaching_weeks)?;
        let periods = parse_periods(&record.class_periods)?;
        if weeks.is_empty() || periods.is_empty() {
            tracing::warn!(
                "'{}' resolves to no weeks or periods (weeks='{}', periods='{}')",
                record.title,
                record.teaching_weeks,
                record.class_periods
            );
            return Ok(Vec::new());
        }

        let (start_time, end_time) = self.time_span(record, &periods)?;
        weeks
            .into_iter()
            .map(|week| {
                let date = occurrence_date(self.config.first_monday, week, record.weekday)?;
                Ok(CalendarOccurrence {
                    title: record.title.clone(),
                    teacher: record.teacher.clone(),
                    weeks_raw: record.teaching_weeks.clone(),
                    periods_raw: record.class_periods.clone(),
                    location: record.location.clone(),
                    start: NaiveDateTime::new(date, start_time),
                    end: NaiveDateTime::new(date, end_time),
                    uid: occurrence_uid(&record.title, week, record.weekday, start_time),
                })
            })
            .collect()
    }

    /// 展开全部课程记录，任意一条出错即整体失败
    pub fn expand(&self, records: &[CourseRecord]) -> Result<Vec<CalendarOccurrence>> {
        let mut all = Vec::new();
        for record in records {
            all.extend(self.occurrences(record)?);
        }
        Ok(all)
    }

    /// 序列化为 ICS 文本
    pub fn render(&self, occurrences: &[CalendarOccurrence]) -> String {
        let mut ics = IcsWriter::default();

        ics.line("BEGIN:VCALENDAR");
        ics.line("VERSION:2.0");
        ics.line(&format!("PRODID:{PRODUCT_ID}"));
        ics.line("CALSCALE:GREGORIAN");
        ics.line("METHOD:PUBLISH");
        ics.line(&format!(
            "X-WR-CALNAME:{}",
            escape_text(&self.options.calendar_name)
        ));
        ics.line(&format!("X-WR-TIMEZONE:{TIMEZONE}"));
        Self::add_timezone(&mut ics);

        let dtstamp = self.options.generated_at.format("%Y%m%dT%H%M%SZ").to_string();
        for occurrence in occurrences {
            self.add_event(&mut ics, occurrence, &dtstamp);
        }

        ics.line("END:VCALENDAR");
        ics.finish()
    }

    /// 展开并序列化
    pub fn generate(&self, records: &[CourseRecord]) -> Result<String> {
        let occurrences = self.expand(records)?;
        tracing::info!(
            "Synthesized {} events from {} course records",
            occurrences.len(),
            records.len()
        );
        Ok(self.render(&occurrences))
    }

    fn add_timezone(ics: &mut IcsWriter) {
        ics.line("BEGIN:VTIMEZONE");
        ics.line(&format!("TZID:{TIMEZONE}"));
        ics.line(&format!("X-LIC-LOCATION:{TIMEZONE}"));
        ics.line("BEGIN:STANDARD");
        ics.line("TZOFFSETFROM:+0800");
        ics.line("TZOFFSETTO:+0800");
        ics.line("TZNAME:CST");
        ics.line("DTSTART:19700101T000000");
        ics.line("END:STANDARD");
        ics.line("END:VTIMEZONE");
    }

    fn add_event(&self, ics: &mut IcsWriter, occurrence: &CalendarOccurrence, dtstamp: &str) {
        let description = format!(
            "教师: {}\n教学周: {}\n节次: {}",
            occurrence.teacher, occurrence.weeks_raw, occurrence.periods_raw
        );

        ics.line("BEGIN:VEVENT");
        ics.line(&format!("UID:{}", escape_text(&occurrence.uid)));
        ics.line(&format!("DTSTAMP:{dtstamp}"));
        ics.line(&format!("SUMMARY:{}", escape_text(&occurrence.title)));
        ics.line(&format!("DESCRIPTION:{}", escape_text(&description)));
        ics.line(&format!("LOCATION:{}", escape_text(&occurrence.location)));
        ics.line(&format!(
            "DTSTART;TZID={TIMEZONE}:{}",
            occurrence.start.format(LOCAL_FORMAT)
        ));
        ics.line(&format!(
            "DTEND;TZID={TIMEZONE}:{}",
            occurrence.end.format(LOCAL_FORMAT)
        ));

        if let Some(minutes) = self.options.reminder.minutes() {
            ics.line(&format!("X-REMINDER-MINUTES:{minutes}"));
            ics.line("BEGIN:VALARM");
            ics.line("ACTION:DISPLAY");
            ics.line("DESCRIPTION:课程提醒");
            match self.options.reminder {
                ReminderPolicy::MinutesBefore(m) => ics.line(&format!("TRIGGER:-PT{m}M")),
                _ => ics.line("TRIGGER:PT0S"),
            }
            ics.line("END:VALARM");
        }

        ics.line("END:VEVENT");
    }
}

/// 转义ICS文本内容
pub fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace("\r\n", "\\n")
        .replace('\n', "\\n")
        .replace(',', "\\,")
        .replace(';', "\\;")
}

/// 按 RFC 5545 写行：CRLF 结尾，超过 75 字节折行
#[derive(Default)]
struct IcsWriter {
    out: String,
}

impl IcsWriter {
    fn line(&mut self, content: &str) {
        let mut width = 0;
        for ch in content.chars() {
            let len = ch.len_utf8();
            if width + len > MAX_LINE_OCTETS {
                self.out.push_str("\r\n ");
                width = 1;
            }
            self.out.push(ch);
            width += len;
        }
        self.out.push_str("\r\n");
    }

    fn finish(self) -> String {
        self.out
    }
}
