use crate::{ColumnType, SqlExpr, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringEscape {
    /// MySQL `mysql_real_escape_string` rules.
    Backslash,
    /// ANSI doubling of single quotes only.
    Standard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatFormat {
    Fixed(usize),
    Shortest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BytesLiteral {
    /// `X'0a1b'`
    HexX,
    /// `'\x0a1b'::bytea`
    PgBytea,
}

/// A dotted identifier path or a raw expression standing in for one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentPath {
    Segments(Vec<String>),
    Expr(SqlExpr),
}

impl From<&str> for IdentPath {
    fn from(value: &str) -> Self {
        Self::Segments(value.split('.').map(str::to_string).collect())
    }
}

impl From<String> for IdentPath {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<&String> for IdentPath {
    fn from(value: &String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<&[&str]> for IdentPath {
    fn from(value: &[&str]) -> Self {
        Self::Segments(value.iter().map(|segment| (*segment).to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for IdentPath {
    fn from(value: [&str; N]) -> Self {
        Self::Segments(value.iter().map(|segment| (*segment).to_string()).collect())
    }
}

impl From<Vec<String>> for IdentPath {
    fn from(value: Vec<String>) -> Self {
        Self::Segments(value)
    }
}

impl From<SqlExpr> for IdentPath {
    fn from(value: SqlExpr) -> Self {
        Self::Expr(value)
    }
}

impl From<&SqlExpr> for IdentPath {
    fn from(value: &SqlExpr) -> Self {
        Self::Expr(value.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quoting {
    identifier_quote: char,
    string_escape: StringEscape,
    float_format: FloatFormat,
    bytes_literal: BytesLiteral,
    bool_literals: (&'static str, &'static str),
    max_decimal: f64,
    auto_quote_identifiers: bool,
}

impl Quoting {
    pub const fn mysql() -> Self {
        Self {
            identifier_quote: '`',
            string_escape: StringEscape::Backslash,
            float_format: FloatFormat::Fixed(6),
            bytes_literal: BytesLiteral::HexX,
            bool_literals: ("1", "0"),
            max_decimal: 99_999_999.9999,
            auto_quote_identifiers: true,
        }
    }

    pub const fn postgres() -> Self {
        Self {
            identifier_quote: '"',
            string_escape: StringEscape::Standard,
            float_format: FloatFormat::Shortest,
            bytes_literal: BytesLiteral::PgBytea,
            bool_literals: ("TRUE", "FALSE"),
            max_decimal: 99_999_999.9999,
            auto_quote_identifiers: true,
        }
    }

    pub const fn sqlite() -> Self {
        Self {
            identifier_quote: '"',
            string_escape: StringEscape::Standard,
            float_format: FloatFormat::Shortest,
            bytes_literal: BytesLiteral::HexX,
            bool_literals: ("1", "0"),
            max_decimal: 99_999_999.9999,
            auto_quote_identifiers: true,
        }
    }

    #[must_use]
    pub const fn with_auto_quote(mut self, auto_quote_identifiers: bool) -> Self {
        self.auto_quote_identifiers = auto_quote_identifiers;
        self
    }

    #[must_use]
    pub const fn identifier_quote(&self) -> char {
        self.identifier_quote
    }

    #[must_use]
    pub const fn string_escape(&self) -> StringEscape {
        self.string_escape
    }

    pub fn quote_identifier(&self, ident: impl Into<IdentPath>) -> String {
        self.quote_identifier_auto(ident, false)
    }

    /// With `auto_only` set, the path is quoted only when auto-quoting is enabled.
    pub fn quote_identifier_auto(&self, ident: impl Into<IdentPath>, auto_only: bool) -> String {
        let quote = !auto_only || self.auto_quote_identifiers;
        match ident.into() {
            IdentPath::Expr(expr) => expr.into_string(),
            IdentPath::Segments(segments) => {
                let rendered = segments
                    .iter()
                    .map(|segment| segment.trim())
                    .filter(|segment| !segment.is_empty())
                    .map(|segment| {
                        if segment == "*" || !quote {
                            segment.to_string()
                        } else {
                            self.quote_segment(segment)
                        }
                    })
                    .collect::<Vec<_>>();
                if rendered.is_empty() {
                    "*".to_string()
                } else {
                    rendered.join(".")
                }
            }
        }
    }

    pub fn quote_identifier_as(&self, ident: impl Into<IdentPath>, alias: Option<&str>) -> String {
        let quoted = self.quote_identifier(ident);
        match alias.filter(|alias| !alias.is_empty()) {
            Some(alias) => format!("{quoted} AS {}", self.quote_segment(alias)),
            None => quoted,
        }
    }

    #[must_use]
    pub fn quote_segment(&self, segment: &str) -> String {
        let quote = self.identifier_quote;
        let mut quoted = String::with_capacity(segment.len() + 2);
        quoted.push(quote);
        for ch in segment.chars() {
            if ch == quote {
                quoted.push(quote);
            }
            quoted.push(ch);
        }
        quoted.push(quote);
        quoted
    }

    /// Renders a literal that is safe to interpolate into SQL text.
    #[must_use]
    pub fn quote_value(&self, value: &Value, column_type: Option<ColumnType>) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Expr(expr) => expr.as_str().to_string(),
            Value::List(values) => values
                .iter()
                .map(|value| self.quote_value(value, column_type))
                .collect::<Vec<_>>()
                .join(", "),
            Value::Bool(value) => {
                let (yes, no) = self.bool_literals;
                if *value { yes } else { no }.to_string()
            }
            Value::Int(value) => match column_type {
                Some(column_type) if column_type.is_fractional() => {
                    self.format_float(*value as f64)
                }
                _ => value.to_string(),
            },
            Value::Float(value) => match column_type {
                Some(column_type) if column_type.is_integral() => {
                    self.format_integer(value.trunc())
                }
                _ => self.format_float(*value),
            },
            Value::Text(text) => match column_type {
                Some(column_type) if column_type.is_integral() => {
                    leading_integer(text).to_string()
                }
                Some(column_type) if column_type.is_fractional() => {
                    self.format_float(text.trim().parse().unwrap_or(0.0))
                }
                _ => self.quote_string(text),
            },
            Value::Bytes(bytes) => self.quote_bytes(bytes),
        }
    }

    #[must_use]
    pub fn quote_string(&self, text: &str) -> String {
        let mut quoted = String::with_capacity(text.len() + 2);
        quoted.push('\'');
        for ch in text.chars() {
            match (self.string_escape, ch) {
                (_, '\0') => {}
                (StringEscape::Standard, '\'') => quoted.push_str("''"),
                (StringEscape::Standard, other) => quoted.push(other),
                (StringEscape::Backslash, '\'') => quoted.push_str("\\'"),
                (StringEscape::Backslash, '"') => quoted.push_str("\\\""),
                (StringEscape::Backslash, '\\') => quoted.push_str("\\\\"),
                (StringEscape::Backslash, '\n') => quoted.push_str("\\n"),
                (StringEscape::Backslash, '\r') => quoted.push_str("\\r"),
                (StringEscape::Backslash, '\u{1a}') => quoted.push_str("\\Z"),
                (StringEscape::Backslash, other) => quoted.push(other),
            }
        }
        quoted.push('\'');
        quoted
    }

    fn quote_bytes(&self, bytes: &[u8]) -> String {
        let hex = hex::encode(bytes);
        match self.bytes_literal {
            BytesLiteral::HexX => format!("X'{hex}'"),
            BytesLiteral::PgBytea => format!("'\\x{hex}'::bytea"),
        }
    }

    fn format_float(&self, value: f64) -> String {
        let value = self.clamp(value);
        match self.float_format {
            FloatFormat::Fixed(digits) => format!("{value:.digits$}"),
            FloatFormat::Shortest => {
                let rendered = value.to_string();
                if rendered.contains(['.', 'e', 'E']) {
                    rendered
                } else {
                    format!("{rendered}.0")
                }
            }
        }
    }

    fn format_integer(&self, value: f64) -> String {
        format!("{:.0}", self.clamp(value))
    }

    fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            0.0
        } else if value.is_infinite() {
            value.signum() * self.max_decimal
        } else {
            value
        }
    }

    /// Replaces `?` in `template` with the quoted value; every occurrence when
    /// `count` is `None`, otherwise only the first `count` ones.
    #[must_use]
    pub fn quote_into(
        &self,
        template: &str,
        value: &Value,
        column_type: Option<ColumnType>,
        count: Option<usize>,
    ) -> String {
        let quoted = self.quote_value(value, column_type);
        match count {
            None => template.replace('?', &quoted),
            Some(count) => template.replacen('?', &quoted, count),
        }
    }
}

fn leading_integer(text: &str) -> i64 {
    let trimmed = text.trim_start();
    let mut end = 0;
    for (index, ch) in trimmed.char_indices() {
        if ch.is_ascii_digit() || (index == 0 && (ch == '-' || ch == '+')) {
            end = index + ch.len_utf8();
        } else {
            break;
        }
    }
    trimmed[..end].parse().unwrap_or(0)
}
