//! 教学周与节次字符串的解析。
//!
//! 两者都是逗号分隔的 `<n>` 或 `<a>-<b>`（闭区间）；教学周的每一项
//! 还可以带单双周标记，`单`/`odd` 只保留奇数周，`双`/`even` 只保留偶数周。

use std::collections::BTreeSet;

use crate::{Error, Result};

/// 教学周上限，超出视为数据错误
pub const MAX_WEEK: u32 = 60;
/// 节次上限
pub const MAX_PERIOD: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parity {
    Any,
    Odd,
    Even,
}

impl Parity {
    fn accepts(self, n: u32) -> bool {
        match self {
            Self::Any => true,
            Self::Odd => n % 2 == 1,
            Self::Even => n % 2 == 0,
        }
    }

    /// 拆出末尾的单双周标记
    fn split(token: &str) -> (&str, Self) {
        for (suffix, parity) in [
            ("单", Self::Odd),
            ("odd", Self::Odd),
            ("双", Self::Even),
            ("even", Self::Even),
        ] {
            if let Some(rest) = token.strip_suffix(suffix) {
                return (rest, parity);
            }
        }
        (token, Self::Any)
    }
}

fn tokens(spec: &str) -> impl Iterator<Item = &str> {
    spec.split([',', '，'])
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn parse_number(text: &str, spec: &str, max: u32) -> Result<u32> {
    match text.trim().parse::<u32>() {
        Ok(n) if n > max => Err(Error::Data(format!(
            "number {n} in '{spec}' exceeds the limit of {max}"
        ))),
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::Data(format!("invalid number '{text}' in '{spec}'"))),
    }
}

fn parse_span(token: &str, spec: &str, max: u32) -> Result<(u32, u32)> {
    match token.split_once('-') {
        Some((start, end)) => {
            let (start, end) = (parse_number(start, spec, max)?, parse_number(end, spec, max)?);
            if start > end {
                return Err(Error::Data(format!("reversed range '{token}' in '{spec}'")));
            }
            Ok((start, end))
        }
        None => {
            let n = parse_number(token, spec, max)?;
            Ok((n, n))
        }
    }
}

fn strip_decorations(token: &str, decorations: &[char]) -> String {
    token
        .chars()
        .filter(|c| !decorations.contains(c) && !c.is_whitespace())
        .collect()
}

/// 解析教学周，返回升序去重的周次
///
/// `"1-16单"` → 1,3,..,15；单独一周与标记矛盾时（如 `"5双"`）不贡献任何周。
pub fn parse_weeks(spec: &str) -> Result<Vec<u32>> {
    let mut weeks = BTreeSet::new();
    for token in tokens(spec) {
        let cleaned = strip_decorations(token, &['周', '(', ')', '（', '）']);
        let (body, parity) = Parity::split(&cleaned);
        let (start, end) = parse_span(body, spec, MAX_WEEK)?;
        weeks.extend((start..=end).filter(|&w| parity.accepts(w)));
    }
    Ok(weeks.into_iter().collect())
}

/// 解析节次，返回升序去重的节次号
pub fn parse_periods(spec: &str) -> Result<Vec<u32>> {
    let mut periods = BTreeSet::new();
    for token in tokens(spec) {
        let cleaned = strip_decorations(token, &['节', '第']);
        let (start, end) = parse_span(&cleaned, spec, MAX_PERIOD)?;
        periods.extend(start..=end);
    }
    Ok(periods.into_iter().collect())
}
