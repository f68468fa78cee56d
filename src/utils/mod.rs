use anyhow::{anyhow, Result};
use chrono::{Datelike, NaiveDate};
use serde_json::Value;

/// Season label ("YYYY-YY") for a game date. October through December belong to
/// the season starting that year; January through September to the previous one.
pub fn season_label(date: NaiveDate) -> String {
    let start_year = if date.month() >= 10 { date.year() } else { date.year() - 1 };
    season_from_start_year(start_year)
}

/// 2023 -> "2023-24"
pub fn season_from_start_year(start_year: i32) -> String {
    format!("{}-{:02}", start_year, (start_year + 1).rem_euclid(100))
}

/// Season that is in progress (or most recently finished) on `today`.
pub fn current_season(today: NaiveDate) -> String {
    season_label(today)
}

/// Parse "2023-24" into its start year, rejecting labels whose suffix is not start + 1.
pub fn parse_season(label: &str) -> Result<i32> {
    let (start, end) = label
        .trim()
        .split_once('-')
        .ok_or_else(|| anyhow!("season '{}' is not in YYYY-YY form", label))?;

    if start.len() != 4 || end.len() != 2 {
        return Err(anyhow!("season '{}' is not in YYYY-YY form", label));
    }

    let start_year: i32 = start
        .parse()
        .map_err(|_| anyhow!("season '{}' has a non-numeric start year", label))?;
    let end_suffix: i32 = end
        .parse()
        .map_err(|_| anyhow!("season '{}' has a non-numeric end year", label))?;

    if (start_year + 1).rem_euclid(100) != end_suffix {
        return Err(anyhow!("season '{}' does not span consecutive years", label));
    }

    Ok(start_year)
}

/// Nominal calendar window of a season: October 1 of the start year through
/// June 30 of the end year, inclusive.
pub fn season_bounds(label: &str) -> Result<(NaiveDate, NaiveDate)> {
    let start_year = parse_season(label)?;
    let start = NaiveDate::from_ymd_opt(start_year, 10, 1)
        .ok_or_else(|| anyhow!("no October 1 for season '{}'", label))?;
    let end = NaiveDate::from_ymd_opt(start_year + 1, 6, 30)
        .ok_or_else(|| anyhow!("no June 30 for season '{}'", label))?;
    Ok((start, end))
}

/// Minutes played from "MM:SS", "MM.ffff:SS", a bare number, or a numeric string.
/// Anything else (null, "", "DNP - Coach's Decision") means the player did not play.
pub fn parse_minutes(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|m| m.is_finite() && *m >= 0.0),
        Value::String(s) => parse_minutes_str(s),
        _ => None,
    }
}

pub fn parse_minutes_str(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let minutes = match raw.split_once(':') {
        Some((mins, secs)) => {
            let mins: f64 = mins.trim().parse().ok()?;
            let secs: f64 = secs.trim().parse().ok()?;
            if !(0.0..60.0).contains(&secs) {
                return None;
            }
            mins + secs / 60.0
        }
        None => raw.parse().ok()?,
    };

    (minutes.is_finite() && minutes >= 0.0).then_some(minutes)
}

/// Birth dates arrive as "1984-12-30", "1984-12-30T00:00:00" or "DEC 30, 1984".
/// Unrecognised values yield `None` rather than an error.
pub fn parse_birth_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let date_part = raw.split('T').next().unwrap_or(raw);

    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%b %d, %Y"))
        .or_else(|_| NaiveDate::parse_from_str(raw, "%m/%d/%Y"))
        .ok()
}

/// Upstream game ids are exactly ten ASCII digits, e.g. "0022300061".
pub fn is_valid_game_id(game_id: &str) -> bool {
    game_id.len() == 10 && game_id.bytes().all(|b| b.is_ascii_digit())
}

/// City for a team payload that lacks one: the last word of the team name.
pub fn city_fallback(team_name: &str) -> String {
    team_name
        .split_whitespace()
        .last()
        .unwrap_or(team_name)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_season_label_october_cutover() {
        assert_eq!(season_label(date(2024, 1, 15)), "2023-24");
        assert_eq!(season_label(date(2024, 11, 2)), "2024-25");
        assert_eq!(season_label(date(2024, 9, 30)), "2023-24");
        assert_eq!(season_label(date(2024, 10, 1)), "2024-25");
        assert_eq!(season_label(date(1999, 12, 25)), "1999-00");
    }

    #[test]
    fn test_parse_season() {
        assert_eq!(parse_season("2023-24").unwrap(), 2023);
        assert_eq!(parse_season("1999-00").unwrap(), 1999);
        assert!(parse_season("2023-25").is_err());
        assert!(parse_season("2023").is_err());
        assert!(parse_season("20a3-24").is_err());
    }

    #[test]
    fn test_season_bounds() {
        let (start, end) = season_bounds("2023-24").unwrap();
        assert_eq!(start, date(2023, 10, 1));
        assert_eq!(end, date(2024, 6, 30));
    }

    #[test]
    fn test_parse_minutes() {
        assert_eq!(parse_minutes(&json!("34:30")), Some(34.5));
        assert_eq!(parse_minutes(&json!("12.000000:45")), Some(12.75));
        assert_eq!(parse_minutes(&json!(28)), Some(28.0));
        assert_eq!(parse_minutes(&json!("31")), Some(31.0));
        assert_eq!(parse_minutes(&json!(null)), None);
        assert_eq!(parse_minutes(&json!("")), None);
        assert_eq!(parse_minutes(&json!("DNP - Coach's Decision")), None);
        assert_eq!(parse_minutes(&json!("12:75")), None);
    }

    #[test]
    fn test_parse_birth_date_tolerates_garbage() {
        assert_eq!(parse_birth_date("1984-12-30"), Some(date(1984, 12, 30)));
        assert_eq!(parse_birth_date("1984-12-30T00:00:00"), Some(date(1984, 12, 30)));
        assert_eq!(parse_birth_date("DEC 30, 1984"), Some(date(1984, 12, 30)));
        assert_eq!(parse_birth_date("not a date"), None);
        assert_eq!(parse_birth_date("1984-02-31"), None);
    }

    #[test]
    fn test_game_id_format() {
        assert!(is_valid_game_id("0022300061"));
        assert!(!is_valid_game_id("22300061"));
        assert!(!is_valid_game_id("00223000A1"));
        assert!(!is_valid_game_id(""));
    }

    #[test]
    fn test_city_fallback() {
        assert_eq!(city_fallback("Los Angeles Lakers"), "Lakers");
        assert_eq!(city_fallback("Heat"), "Heat");
    }
}
