use super::*;
use crate::config::{PeriodTable, TimetableConfig};
use chrono::{NaiveDate, TimeZone, Utc};
use ical::parser::ical::IcalParser;
use std::io::{BufReader, Cursor};

fn config() -> TimetableConfig {
    let periods = PeriodTable::try_from(
        &[
            ("1", "08:00-08:45"),
            ("2", "08:55-09:40"),
            ("3", "10:00-10:45"),
            ("4", "10:55-11:40"),
            ("7", "16:00-16:45"),
        ][..],
    )
    .unwrap();
    TimetableConfig::new(periods, NaiveDate::from_ymd_opt(2025, 9, 1).unwrap())
}

fn options(reminder: ReminderPolicy) -> IcsOptions {
    IcsOptions {
        calendar_name: "课程表".to_string(),
        reminder,
        generated_at: Utc.with_ymd_and_hms(2025, 8, 20, 0, 0, 0).unwrap(),
    }
}

fn course(weeks: &str, periods: &str) -> CourseRecord {
    CourseRecord {
        weekday: 1,
        title: "高等数学".to_string(),
        teacher: "张三".to_string(),
        teaching_weeks: weeks.to_string(),
        class_periods: periods.to_string(),
        location: "A101".to_string(),
    }
}

fn event_count(ics: &str) -> usize {
    ics.matches("BEGIN:VEVENT").count()
}

#[test]
fn test_occurrence_date() {
    let monday = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
    assert_eq!(occurrence_date(monday, 1, 1).unwrap(), monday);
    assert_eq!(
        occurrence_date(monday, 2, 3).unwrap(),
        NaiveDate::from_ymd_opt(2025, 9, 10).unwrap()
    );
    assert_eq!(
        occurrence_date(monday, 18, 7).unwrap(),
        NaiveDate::from_ymd_opt(2026, 1, 4).unwrap()
    );
    assert!(matches!(
        occurrence_date(monday, u32::MAX, 7),
        Err(Error::Data(_))
    ));
}

#[test]
fn test_oversized_weeks_are_data_errors() {
    let config = config();
    let synthesizer = CalendarSynthesizer::new(&config, options(ReminderPolicy::Disabled));

    for weeks in ["99999999", "1-4000000000", "61"] {
        let result = synthesizer.generate(&[course(weeks, "1-2")]);
        assert!(matches!(result, Err(Error::Data(_))), "weeks spec {weeks}");
    }
}

#[test]
fn test_end_to_end_two_weeks() {
    let config = config();
    let synthesizer = CalendarSynthesizer::new(&config, options(ReminderPolicy::Disabled));

    let occurrences = synthesizer.expand(&[course("1-2", "1-2")]).unwrap();
    assert_eq!(occurrences.len(), 2);
    assert_eq!(
        occurrences[0].start,
        NaiveDate::from_ymd_opt(2025, 9, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    );
    assert_eq!(
        occurrences[1].start,
        NaiveDate::from_ymd_opt(2025, 9, 8)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    );
    assert_eq!(occurrences[0].end.format("%H:%M").to_string(), "09:40");

    let ics = synthesizer.render(&occurrences);
    assert!(ics.contains("DTSTART;TZID=Asia/Shanghai:20250901T080000\r\n"));
    assert!(ics.contains("DTEND;TZID=Asia/Shanghai:20250908T094000\r\n"));
    assert!(ics.contains("UID:高等数学_1_1_08:00@courses\r\n"));
}

#[test]
fn test_event_count_matches_weeks() {
    let config = config();
    let synthesizer = CalendarSynthesizer::new(&config, options(ReminderPolicy::default()));

    for (weeks, expected) in [("1-16", 16), ("1-16单", 8), ("2-16双", 8), ("5双", 0), ("1,3,5-6", 4)] {
        let ics = synthesizer.generate(&[course(weeks, "3-4")]).unwrap();
        assert_eq!(event_count(&ics), expected, "weeks spec {weeks}");
    }
}

#[test]
fn test_uid_is_stable() {
    let config = config();
    let synthesizer = CalendarSynthesizer::new(&config, options(ReminderPolicy::Disabled));
    let record = course("1-4", "3-4");

    let first = synthesizer.occurrences(&record).unwrap();
    let second = synthesizer.occurrences(&record).unwrap();
    let uids: Vec<_> = first.iter().map(|o| o.uid.clone()).collect();
    assert_eq!(uids, second.iter().map(|o| o.uid.clone()).collect::<Vec<_>>());
    assert_eq!(uids[2], "高等数学_3_1_10:00@courses");

    // 同一课程在不同星期、节次不冲突
    let mut thursday = course("1-4", "7");
    thursday.weekday = 4;
    let other = synthesizer.occurrences(&thursday).unwrap();
    assert!(other.iter().all(|o| !uids.contains(&o.uid)));
}

#[test]
fn test_non_contiguous_periods_form_one_span() {
    let config = config();
    let synthesizer = CalendarSynthesizer::new(&config, options(ReminderPolicy::Disabled));

    let occurrences = synthesizer.occurrences(&course("1", "3-4,7")).unwrap();
    assert_eq!(occurrences.len(), 1);
    assert_eq!(occurrences[0].start.format("%H:%M").to_string(), "10:00");
    assert_eq!(occurrences[0].end.format("%H:%M").to_string(), "16:45");
}

#[test]
fn test_reminder_variants() {
    let config = config();
    let record = [course("1", "1-2")];

    let disabled = CalendarSynthesizer::new(&config, options(ReminderPolicy::Disabled))
        .generate(&record)
        .unwrap();
    assert!(!disabled.contains("BEGIN:VALARM"));
    assert!(!disabled.contains("X-REMINDER-MINUTES"));

    let at_start = CalendarSynthesizer::new(&config, options(ReminderPolicy::AtStart))
        .generate(&record)
        .unwrap();
    assert!(at_start.contains("TRIGGER:PT0S\r\n"));
    assert!(at_start.contains("X-REMINDER-MINUTES:0\r\n"));

    let before = CalendarSynthesizer::new(&config, options(ReminderPolicy::MinutesBefore(15)))
        .generate(&record)
        .unwrap();
    assert!(before.contains("TRIGGER:-PT15M\r\n"));
    assert!(before.contains("X-REMINDER-MINUTES:15\r\n"));
}

#[test]
fn test_missing_period_is_data_error() {
    let config = config();
    let synthesizer = CalendarSynthesizer::new(&config, options(ReminderPolicy::Disabled));

    let result = synthesizer.generate(&[course("1-2", "1-2"), course("1-16", "5-6")]);
    assert!(matches!(result, Err(Error::Data(_))));
}

#[test]
fn test_invalid_weekday_is_data_error() {
    let config = config();
    let synthesizer = CalendarSynthesizer::new(&config, options(ReminderPolicy::Disabled));
    let mut record = course("1", "1");
    record.weekday = 8;
    assert!(matches!(synthesizer.occurrences(&record), Err(Error::Data(_))));
}

#[test]
fn test_single_timezone_and_static_header() {
    let config = config();
    let synthesizer = CalendarSynthesizer::new(&config, options(ReminderPolicy::Disabled));

    let empty = synthesizer.generate(&[]).unwrap();
    let full = synthesizer
        .generate(&[course("1-16", "1-2"), course("1-8", "3-4")])
        .unwrap();

    for ics in [&empty, &full] {
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\nVERSION:2.0\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
        assert_eq!(ics.matches("BEGIN:VTIMEZONE").count(), 1);
        assert!(ics.contains("X-WR-CALNAME:课程表\r\n"));
        assert!(ics.contains("METHOD:PUBLISH\r\n"));
    }
    assert_eq!(event_count(&full), 24);
}

#[test]
fn test_text_escaping_and_folding() {
    let config = config();
    let synthesizer = CalendarSynthesizer::new(&config, options(ReminderPolicy::Disabled));
    let mut record = course("1", "1");
    record.title = "数据结构;算法,设计".to_string();
    record.location = "第一教学楼A区一层东侧多媒体阶梯教室（靠近图书馆与实验楼之间的连廊）".to_string();

    let ics = synthesizer.generate(&[record]).unwrap();
    assert!(ics.contains("SUMMARY:数据结构\\;算法\\,设计\r\n"));
    assert!(ics.contains("DESCRIPTION:教师: 张三\\n教学周: 1\\n节次: 1\r\n"));
    for line in ics.split("\r\n") {
        assert!(line.len() <= 75, "line too long: {line}");
    }
}

#[test]
fn test_output_parses_as_icalendar() {
    let config = config();
    let synthesizer = CalendarSynthesizer::new(&config, options(ReminderPolicy::MinutesBefore(30)));
    let mut record = course("1-3", "1-2");
    record.location = "第一教学楼A区一层东侧多媒体阶梯教室（靠近图书馆与实验楼之间的连廊）".to_string();
    let ics = synthesizer.generate(&[record.clone()]).unwrap();

    let calendars: Vec<_> = IcalParser::new(BufReader::new(Cursor::new(ics.into_bytes())))
        .collect::<std::result::Result<_, _>>()
        .expect("生成的ICS应能被解析");
    assert_eq!(calendars.len(), 1);

    let events = &calendars[0].events;
    assert_eq!(events.len(), 3);
    let property = |name: &str| {
        events[0]
            .properties
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.value.clone())
    };
    assert_eq!(property("SUMMARY").as_deref(), Some("高等数学"));
    assert_eq!(property("LOCATION"), Some(record.location));
    assert_eq!(property("DTSTART").as_deref(), Some("20250901T080000"));
}

#[test]
fn test_json_intermediate_is_idempotent() {
    let config = config();
    let synthesizer = CalendarSynthesizer::new(&config, options(ReminderPolicy::default()));
    let records = vec![course("1-16单", "1-2"), {
        let mut r = course("2-8双", "3-4,7");
        r.weekday = 5;
        r.title = "大学物理".to_string();
        r
    }];

    let json = serde_json::to_string_pretty(&records).unwrap();
    let reloaded: Vec<CourseRecord> = serde_json::from_str(&json).unwrap();

    let direct = synthesizer.expand(&records).unwrap();
    let via_json = synthesizer.expand(&reloaded).unwrap();
    assert_eq!(direct, via_json);
    assert_eq!(
        synthesizer.render(&direct),
        synthesizer.render(&via_json)
    );
}
