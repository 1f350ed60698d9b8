//! 课表页面解析：`table#mytable` → [`CourseRecord`] 列表。
//!
//! 表头之后的每一行以 `td.td1` 标注时段（上午/下午/晚上），随后的
//! `td.td` 依次对应周一到周日；单元格内每个课程块是一个带
//! `padding-bottom:5px;clear:both;` 样式的 `div`，内部文本依次为
//! 课程名、教师、`周次[节次]`、地点。

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::{CourseRecord, Error, Result};

const DAYS_PER_WEEK: usize = 7;
const TEACHER_LABELS: [&str; 2] = ["教师:", "教师："];

static TABLE: LazyLock<Selector> = LazyLock::new(|| selector("table#mytable"));
static ROW: LazyLock<Selector> = LazyLock::new(|| selector("tr"));
static LABEL_CELL: LazyLock<Selector> = LazyLock::new(|| selector("td.td1"));
static DAY_CELL: LazyLock<Selector> = LazyLock::new(|| selector("td.td"));
static COURSE_BLOCK: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"div[style*="padding-bottom:5px;clear:both;"]"#));
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"font[style="font-weight: bolder"]"#));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

/// 解析课表页面，按扫描顺序返回课程记录
pub fn parse_schedule(markup: &str) -> Result<Vec<CourseRecord>> {
    let document = Html::parse_document(markup);
    let table = document
        .select(&TABLE)
        .next()
        .ok_or_else(|| Error::Parse("schedule table #mytable not found".to_string()))?;

    let mut rows = table.select(&ROW);
    if rows.next().is_none() {
        return Err(Error::Parse("schedule table has no header row".to_string()));
    }

    let mut courses = Vec::new();
    for row in rows {
        if row.select(&LABEL_CELL).next().is_none() {
            continue;
        }
        for (index, cell) in row.select(&DAY_CELL).take(DAYS_PER_WEEK).enumerate() {
            let weekday = u32::try_from(index + 1).map_err(|_| {
                Error::Parse(format!("day column {index} out of range"))
            })?;
            for block in cell.select(&COURSE_BLOCK) {
                if let Some(course) = parse_course_block(block, weekday)? {
                    courses.push(course);
                }
            }
        }
    }

    tracing::info!("Parsed {} course blocks from timetable", courses.len());
    Ok(courses)
}

/// 解析单个课程块
///
/// 没有标题的装饰性块、缺课程名/周次/节次的块（包括节次括号未闭合）
/// 返回 `Ok(None)`，不影响同一页面的其他课程。
fn parse_course_block(block: ElementRef<'_>, weekday: u32) -> Result<Option<CourseRecord>> {
    let Some(title_node) = block.select(&TITLE).next() else {
        return Ok(None);
    };
    let title = title_node.text().collect::<String>().trim().to_string();

    let lines: Vec<&str> = block
        .text()
        .flat_map(|t| t.split('|'))
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let teacher = lines
        .get(1)
        .map_or("", |l| strip_teacher_label(l))
        .to_string();
    let (teaching_weeks, class_periods) = match lines.get(2) {
        Some(line) => split_week_period(line),
        None => (String::new(), String::new()),
    };
    let location = lines.get(3).copied().unwrap_or_default().to_string();

    if title.is_empty() || teaching_weeks.is_empty() || class_periods.is_empty() {
        tracing::warn!(
            "Dropping incomplete course block on weekday {}: title='{}' weeks='{}' periods='{}'",
            weekday,
            title,
            teaching_weeks,
            class_periods
        );
        return Ok(None);
    }

    Ok(Some(CourseRecord {
        weekday,
        title,
        teacher,
        teaching_weeks,
        class_periods,
        location,
    }))
}

fn strip_teacher_label(line: &str) -> &str {
    TEACHER_LABELS
        .iter()
        .find_map(|label| line.strip_prefix(label))
        .map_or(line, str::trim)
}

/// `"1-16单[3-4]"` → `("1-16单", "3-4")`；缺少任一括号时两者都为空
fn split_week_period(line: &str) -> (String, String) {
    line.split_once('[')
        .and_then(|(weeks, rest)| {
            let (periods, _) = rest.split_once(']')?;
            Some((weeks.trim().to_string(), periods.trim().to_string()))
        })
        .unwrap_or_default()
}
