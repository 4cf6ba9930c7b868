use std::fmt;
use std::str::FromStr;

use crate::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl IntervalUnit {
    /// Upper-case singular keyword, as used in `INTERVAL n DAY`.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Second => "SECOND",
            Self::Minute => "MINUTE",
            Self::Hour => "HOUR",
            Self::Day => "DAY",
            Self::Week => "WEEK",
            Self::Month => "MONTH",
            Self::Year => "YEAR",
        }
    }

    /// Lower-case plural, as used by sqlite date modifiers.
    #[must_use]
    pub const fn plural(self) -> &'static str {
        match self {
            Self::Second => "seconds",
            Self::Minute => "minutes",
            Self::Hour => "hours",
            Self::Day => "days",
            Self::Week => "weeks",
            Self::Month => "months",
            Self::Year => "years",
        }
    }
}

impl fmt::Display for IntervalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for IntervalUnit {
    type Err = ConfigError;

    fn from_str(unit: &str) -> Result<Self, Self::Err> {
        let normalized = unit.trim().to_ascii_uppercase();
        let singular = normalized.strip_suffix('S').unwrap_or(&normalized);
        match singular {
            "SECOND" => Ok(Self::Second),
            "MINUTE" => Ok(Self::Minute),
            "HOUR" => Ok(Self::Hour),
            "DAY" => Ok(Self::Day),
            "WEEK" => Ok(Self::Week),
            "MONTH" => Ok(Self::Month),
            "YEAR" => Ok(Self::Year),
            _ => Err(ConfigError::InvalidIntervalUnit(unit.to_string())),
        }
    }
}

/// Rewrites a `%Y-%m-%d %H:%i:%s` style format through `map`, which returns
/// the target token for a directive letter or `None` to keep it verbatim.
pub fn translate_date_format(
    format: &str,
    map: impl Fn(char) -> Option<&'static str>,
) -> String {
    let mut translated = String::with_capacity(format.len() + 8);
    let mut chars = format.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            translated.push(ch);
            continue;
        }
        match chars.next() {
            Some('%') => translated.push('%'),
            Some(directive) => match map(directive) {
                Some(token) => translated.push_str(token),
                None => {
                    translated.push('%');
                    translated.push(directive);
                }
            },
            None => translated.push('%'),
        }
    }
    translated
}

/// Splits a `$.a.b[0]` JSON path into its key segments.
#[must_use]
pub fn json_path_segments(path: &str) -> Vec<String> {
    path.trim()
        .trim_start_matches('$')
        .split(['.', '['])
        .map(|segment| segment.trim_end_matches(']').trim_matches('"'))
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}
