//! Time utilities for turning textual filter values into epoch seconds.

use chrono::{DateTime, Months, NaiveDate, NaiveDateTime, TimeDelta, Utc};

/// Parses `raw` relative to `now`.
///
/// Accepts plain epoch seconds, `now`, `today`, `yesterday`, `tomorrow`,
/// relative offsets such as `-1 day` or `+2 hours 30 minutes` (optionally
/// followed by `ago`), and absolute datetimes. Absolute values without an
/// offset are read as UTC.
pub fn parse_timestamp(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let value = raw
        .trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_lowercase();

    if value.is_empty() {
        return None;
    }

    if let Ok(seconds) = value.parse::<i64>() {
        return DateTime::<Utc>::from_timestamp(seconds, 0);
    }

    if let Some(instant) = parse_keyword(&value, now) {
        return Some(instant);
    }

    if let Some(instant) = parse_relative(&value, now) {
        return Some(instant);
    }

    parse_datetime(raw.trim())
}

pub fn epoch_seconds(raw: &str, now: DateTime<Utc>) -> Option<i64> {
    parse_timestamp(raw, now).map(|instant| instant.timestamp())
}

fn midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

fn parse_keyword(value: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let today = now.date_naive();
    match value {
        "now" => Some(now),
        "today" | "midnight" => midnight(today),
        "yesterday" => midnight(today.pred_opt()?),
        "tomorrow" => midnight(today.succ_opt()?),
        _ => None,
    }
}

enum Step {
    Fixed(TimeDelta),
    Months(u32),
}

/// `None` for unknown units and for amounts a `TimeDelta` cannot hold.
fn unit_step(unit: &str, amount: i64) -> Option<Step> {
    let unit = unit.trim_end_matches('s');
    let step = match unit {
        "sec" | "second" => Step::Fixed(TimeDelta::try_seconds(amount)?),
        "min" | "minute" => Step::Fixed(TimeDelta::try_minutes(amount)?),
        "hour" => Step::Fixed(TimeDelta::try_hours(amount)?),
        "day" => Step::Fixed(TimeDelta::try_days(amount)?),
        "week" => Step::Fixed(TimeDelta::try_weeks(amount)?),
        "month" => Step::Months(u32::try_from(amount).ok()?),
        "year" => Step::Months(u32::try_from(amount.checked_mul(12)?).ok()?),
        _ => return None,
    };
    Some(step)
}

/// `[+-]N unit [[+-]N unit ...] [ago]`; an unsigned amount inherits the sign
/// of the previous one.
fn parse_relative(value: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (body, ago) = match value.strip_suffix("ago") {
        Some(body) => (body.trim_end(), true),
        None => (value, false),
    };

    let tokens = tokenize(body);
    if tokens.is_empty() || tokens.len() % 2 != 0 {
        return None;
    }

    let mut instant = now;
    let mut negative = ago;
    for pair in tokens.chunks(2) {
        let (amount, unit) = (&pair[0], &pair[1]);
        let magnitude = match amount.chars().next()? {
            '-' => {
                negative = !ago;
                &amount[1..]
            }
            '+' => {
                negative = ago;
                &amount[1..]
            }
            _ => amount.as_str(),
        };
        let magnitude: i64 = magnitude.parse().ok()?;

        instant = match unit_step(unit, magnitude)? {
            Step::Fixed(delta) if negative => instant.checked_sub_signed(delta)?,
            Step::Fixed(delta) => instant.checked_add_signed(delta)?,
            Step::Months(months) if negative => instant.checked_sub_months(Months::new(months))?,
            Step::Months(months) => instant.checked_add_months(Months::new(months))?,
        };
    }

    Some(instant)
}

/// Splits `-1day 2 hours` into `["-1", "day", "2", "hours"]`.
fn tokenize(value: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut numeric = false;

    for ch in value.chars() {
        if ch.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            continue;
        }

        let is_number_part = ch.is_ascii_digit() || ((ch == '-' || ch == '+') && current.is_empty());
        if !current.is_empty() && is_number_part != numeric {
            tokens.push(std::mem::take(&mut current));
        }
        numeric = is_number_part;
        current.push(ch);
    }

    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc));
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(midnight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 30, 0).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn epoch_digits_pass_through() {
        assert_eq!(epoch_seconds("1700000000", now()), Some(1_700_000_000));
    }

    #[test]
    fn keywords_resolve_against_now() {
        assert_eq!(parse_timestamp("now", now()), Some(now()));
        assert_eq!(parse_timestamp("today", now()), Some(at(2024, 3, 15, 0, 0, 0)));
        assert_eq!(parse_timestamp("Yesterday", now()), Some(at(2024, 3, 14, 0, 0, 0)));
        assert_eq!(parse_timestamp("tomorrow", now()), Some(at(2024, 3, 16, 0, 0, 0)));
    }

    #[test]
    fn relative_offsets() {
        assert_eq!(parse_timestamp("-1 day", now()), Some(at(2024, 3, 14, 12, 30, 0)));
        assert_eq!(parse_timestamp("+2 hours", now()), Some(at(2024, 3, 15, 14, 30, 0)));
        assert_eq!(parse_timestamp("-30 minutes", now()), Some(at(2024, 3, 15, 12, 0, 0)));
        assert_eq!(
            parse_timestamp("-1 week 2 days", now()),
            Some(at(2024, 3, 6, 12, 30, 0))
        );
        assert_eq!(parse_timestamp("3 days ago", now()), Some(at(2024, 3, 12, 12, 30, 0)));
        assert_eq!(parse_timestamp("-1month", now()), Some(at(2024, 2, 15, 12, 30, 0)));
    }

    #[test]
    fn absolute_datetimes() {
        assert_eq!(
            parse_timestamp("2024-01-02 03:04:05", now()),
            Some(at(2024, 1, 2, 3, 4, 5))
        );
        assert_eq!(
            parse_timestamp("2024-01-02T03:04:05+01:00", now()),
            Some(at(2024, 1, 2, 2, 4, 5))
        );
        assert_eq!(parse_timestamp("2024-01-02", now()), Some(at(2024, 1, 2, 0, 0, 0)));
    }

    #[test]
    fn out_of_range_offsets_are_rejected() {
        for raw in [
            "-9999999999999999 days",
            "9999999999999999 weeks",
            "-9223372036854775807 seconds",
            "+99999999999999 hours",
            "-1 day 9999999999999999 minutes",
            "99999999999 years",
        ] {
            assert_eq!(parse_timestamp(raw, now()), None, "{raw}");
            assert_eq!(epoch_seconds(raw, now()), None, "{raw}");
        }
        assert_eq!(epoch_seconds("99999999999999999", now()), None);
    }

    #[test]
    fn garbage_is_rejected() {
        for raw in ["", "soonish", "-1 fortnight", "1 2 3", "day"] {
            assert_eq!(parse_timestamp(raw, now()), None, "{raw}");
        }
    }
}
