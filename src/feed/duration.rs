use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDuration {
    pub seconds: Option<i64>,
    pub formatted: Option<String>,
}

fn hms_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([0-9]{1,2}):([0-9]{2}):([0-9]{2})$").expect("valid regex"))
}

fn ms_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([0-9]{1,2}):([0-9]{2})$").expect("valid regex"))
}

/// Parse an `itunes:duration` token.
///
/// `H:MM:SS` and `M:SS` tokens keep their original text as the display
/// string; bare seconds are re-rendered. Anything else yields an empty
/// result rather than an error.
pub fn parse_duration(raw: &str) -> ParsedDuration {
    let token = raw.trim();

    if let Some(seconds) = clock_seconds(token) {
        return ParsedDuration {
            seconds: Some(seconds),
            formatted: Some(token.to_string()),
        };
    }

    if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(seconds) = token.parse::<i64>() {
            return ParsedDuration {
                seconds: Some(seconds),
                formatted: Some(format_duration(seconds)),
            };
        }
    }

    ParsedDuration::default()
}

fn clock_seconds(token: &str) -> Option<i64> {
    if let Some(caps) = hms_pattern().captures(token) {
        return Some(field(&caps, 1)? * 3600 + field(&caps, 2)? * 60 + field(&caps, 3)?);
    }
    let caps = ms_pattern().captures(token)?;
    Some(field(&caps, 1)? * 60 + field(&caps, 2)?)
}

fn field(caps: &regex::Captures, index: usize) -> Option<i64> {
    caps.get(index)?.as_str().parse().ok()
}

/// Render seconds as `H:MM:SS`, or `M:SS` when under an hour.
pub fn format_duration(total: i64) -> String {
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(seconds: i64, formatted: &str) -> ParsedDuration {
        ParsedDuration {
            seconds: Some(seconds),
            formatted: Some(formatted.to_string()),
        }
    }

    #[test]
    fn hours_minutes_seconds_keep_original_text() {
        assert_eq!(parse_duration("1:02:03"), parsed(3723, "1:02:03"));
        assert_eq!(parse_duration("01:02:03"), parsed(3723, "01:02:03"));
        assert_eq!(parse_duration("10:00:00"), parsed(36000, "10:00:00"));
    }

    #[test]
    fn minutes_seconds_keep_original_text() {
        assert_eq!(parse_duration("5:07"), parsed(307, "5:07"));
        assert_eq!(parse_duration("45:30"), parsed(2730, "45:30"));
    }

    #[test]
    fn bare_seconds_are_reformatted() {
        assert_eq!(parse_duration("45"), parsed(45, "0:45"));
        assert_eq!(parse_duration("3725"), parsed(3725, "1:02:05"));
        assert_eq!(parse_duration("600"), parsed(600, "10:00"));
        assert_eq!(parse_duration("0"), parsed(0, "0:00"));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(parse_duration("  12:34\n"), parsed(754, "12:34"));
    }

    #[test]
    fn unrecognised_tokens_are_unknown() {
        let tokens = [
            "",
            "abc",
            "1:2",
            "123:45:67",
            "12.5",
            "-30",
            "1h 20m",
            "1:02:03:04",
            "١٢:٣٤",
            "١:٠٢:٠٣",
        ];
        for raw in tokens {
            assert_eq!(parse_duration(raw), ParsedDuration::default(), "{raw:?}");
        }
    }
}
