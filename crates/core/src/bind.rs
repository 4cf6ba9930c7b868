use crate::{ConfigError, Quoting, Result, StringEscape, Value};

/// Values bound to a statement: positional `?` slots and/or `:name` slots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Binds {
    positional: Vec<Value>,
    named: Vec<(String, Value)>,
}

impl Binds {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Self {
            positional: values.into_iter().map(Into::into).collect(),
            named: Vec::new(),
        }
    }

    #[must_use]
    pub fn push(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Names may be given with or without the leading `:`.
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        let name = name.strip_prefix(':').map(str::to_string).unwrap_or(name);
        match self.named.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value.into(),
            None => self.named.push((name, value.into())),
        }
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    #[must_use]
    pub fn positional_values(&self) -> &[Value] {
        &self.positional
    }
}

impl From<Vec<Value>> for Binds {
    fn from(positional: Vec<Value>) -> Self {
        Self {
            positional,
            named: Vec::new(),
        }
    }
}

impl From<Value> for Binds {
    fn from(value: Value) -> Self {
        Self {
            positional: vec![value],
            named: Vec::new(),
        }
    }
}

/// SQL with only `?` placeholders and the values for them, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

impl BoundQuery {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }
}

#[derive(Debug)]
enum Slot<'a> {
    Positional { offset: usize },
    Named { offset: usize, len: usize, value: &'a Value },
}

impl Slot<'_> {
    fn offset(&self) -> usize {
        match self {
            Self::Positional { offset } | Self::Named { offset, .. } => *offset,
        }
    }
}

/// Rewrites named placeholders to `?` and orders the bound values by where
/// their placeholders appear. Raw expressions and lists are inlined.
pub fn normalize(sql: &str, binds: &Binds, quoting: &Quoting) -> Result<BoundQuery> {
    let literal_ranges = literal_ranges(sql, quoting);
    let in_literal = |offset: usize| {
        literal_ranges
            .iter()
            .any(|(start, end)| offset >= *start && offset < *end)
    };

    let mut slots = sql
        .match_indices('?')
        .map(|(offset, _)| offset)
        .filter(|offset| !in_literal(*offset))
        .map(|offset| Slot::Positional { offset })
        .collect::<Vec<_>>();
    let placeholders = slots.len();

    if !binds.positional.is_empty() && binds.positional.len() != placeholders {
        return Err(ConfigError::BindCountMismatch {
            placeholders,
            given: binds.positional.len(),
        }
        .into());
    }
    let keep_positional = !binds.positional.is_empty();
    if !keep_positional {
        slots.clear();
    }

    for (name, value) in &binds.named {
        let needle = format!(":{name}");
        for (offset, _) in sql.match_indices(&needle) {
            if in_literal(offset) || !is_named_boundary(sql, offset, needle.len()) {
                continue;
            }
            slots.push(Slot::Named {
                offset,
                len: needle.len(),
                value,
            });
        }
    }
    slots.sort_by_key(Slot::offset);

    let mut rewritten = String::with_capacity(sql.len());
    let mut params = Vec::with_capacity(slots.len());
    let mut positional = binds.positional.iter();
    let mut cursor = 0;
    for slot in slots {
        let (offset, len, value) = match slot {
            Slot::Positional { offset } => match positional.next() {
                Some(value) => (offset, 1, value),
                None => continue,
            },
            Slot::Named { offset, len, value } => (offset, len, value),
        };
        rewritten.push_str(&sql[cursor..offset]);
        match value {
            Value::Expr(expr) => rewritten.push_str(expr.as_str()),
            Value::List(_) => rewritten.push_str(&quoting.quote_value(value, None)),
            other => {
                rewritten.push('?');
                params.push(other.clone());
            }
        }
        cursor = offset + len;
    }
    rewritten.push_str(&sql[cursor..]);

    Ok(BoundQuery {
        sql: rewritten,
        params,
    })
}

/// Replaces each `?` outside literals with the quoted parameter. Used by
/// drivers that only speak the simple query protocol.
#[must_use]
pub fn inline_params(sql: &str, params: &[Value], quoting: &Quoting) -> String {
    if params.is_empty() {
        return sql.to_string();
    }
    let literal_ranges = literal_ranges(sql, quoting);
    let mut rendered = String::with_capacity(sql.len() + params.len() * 8);
    let mut params = params.iter();
    let mut cursor = 0;
    for (offset, _) in sql.match_indices('?') {
        if literal_ranges
            .iter()
            .any(|(start, end)| offset >= *start && offset < *end)
        {
            continue;
        }
        let Some(value) = params.next() else {
            break;
        };
        rendered.push_str(&sql[cursor..offset]);
        rendered.push_str(&quoting.quote_value(value, None));
        cursor = offset + 1;
    }
    rendered.push_str(&sql[cursor..]);
    rendered
}

fn is_named_boundary(sql: &str, offset: usize, len: usize) -> bool {
    let bytes = sql.as_bytes();
    if offset > 0 && bytes[offset - 1] == b':' {
        return false;
    }
    match bytes.get(offset + len) {
        Some(next) => !(next.is_ascii_alphanumeric() || *next == b'_'),
        None => true,
    }
}

/// Byte ranges covered by string literals and quoted identifiers. Backslash
/// escapes only apply inside string literals of backslash-escaping dialects.
fn literal_ranges(sql: &str, quoting: &Quoting) -> Vec<(usize, usize)> {
    let identifier_quote = quoting.identifier_quote();
    let backslash_escapes = quoting.string_escape() == StringEscape::Backslash;
    let mut ranges = Vec::new();
    let mut chars = sql.char_indices().peekable();
    while let Some((start, ch)) = chars.next() {
        if ch != '\'' && ch != identifier_quote && ch != '"' {
            continue;
        }
        let quote = ch;
        let mut end = sql.len();
        while let Some((index, next)) = chars.next() {
            if backslash_escapes && next == '\\' && quote != identifier_quote {
                chars.next();
                continue;
            }
            if next == quote {
                if chars.peek().is_some_and(|(_, following)| *following == quote) {
                    chars.next();
                    continue;
                }
                end = index + next.len_utf8();
                break;
            }
        }
        ranges.push((start, end));
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::{Binds, inline_params, normalize};
    use crate::{Error, Quoting, SqlExpr, Value};

    #[test]
    fn named_binds_become_positional_in_text_order() {
        let binds = Binds::new().bind("b", 2).bind("a", 1);
        let bound = normalize("a = :a AND b = :b OR a2 = :a", &binds, &Quoting::mysql())
            .expect("normalize");
        assert_eq!(bound.sql, "a = ? AND b = ? OR a2 = ?");
        assert_eq!(
            bound.params,
            vec![Value::Int(1), Value::Int(2), Value::Int(1)]
        );
    }

    #[test]
    fn mixed_binds_merge_by_offset() {
        let binds = Binds::positional([10, 30]).bind(":mid", 20);
        let bound = normalize("x = ? AND y = :mid AND z = ?", &binds, &Quoting::sqlite())
            .expect("normalize");
        assert_eq!(bound.sql, "x = ? AND y = ? AND z = ?");
        assert_eq!(
            bound.params,
            vec![Value::Int(10), Value::Int(20), Value::Int(30)]
        );
    }

    #[test]
    fn unmatched_named_keys_are_dropped() {
        let binds = Binds::new().bind("id", 5).bind("unused", 6);
        let bound = normalize("id = :id", &binds, &Quoting::mysql()).expect("normalize");
        assert_eq!(bound.params, vec![Value::Int(5)]);
    }

    #[test]
    fn prefix_names_do_not_capture_longer_names() {
        let binds = Binds::new().bind("id", 1).bind("id_two", 2);
        let bound =
            normalize("a = :id_two AND b = :id", &binds, &Quoting::mysql()).expect("normalize");
        assert_eq!(bound.params, vec![Value::Int(2), Value::Int(1)]);
    }

    #[test]
    fn raw_expressions_are_inlined() {
        let binds = Binds::new()
            .bind("now", SqlExpr::new("CURRENT_TIMESTAMP"))
            .bind("id", 3);
        let bound = normalize(
            "UPDATE t SET at = :now WHERE id = :id",
            &binds,
            &Quoting::postgres(),
        )
        .expect("normalize");
        assert_eq!(bound.sql, "UPDATE t SET at = CURRENT_TIMESTAMP WHERE id = ?");
        assert_eq!(bound.params, vec![Value::Int(3)]);
    }

    #[test]
    fn placeholders_inside_literals_are_ignored() {
        let binds = Binds::positional([1]);
        let bound = normalize("SELECT '?', ':x' WHERE a = ?", &binds, &Quoting::mysql())
            .expect("normalize");
        assert_eq!(bound.sql, "SELECT '?', ':x' WHERE a = ?");
        assert_eq!(bound.params.len(), 1);
    }

    #[test]
    fn postgres_casts_are_not_named_binds() {
        let binds = Binds::new().bind("text", "x");
        let bound = normalize("SELECT a::text", &binds, &Quoting::postgres()).expect("normalize");
        assert_eq!(bound.sql, "SELECT a::text");
        assert!(bound.params.is_empty());
    }

    #[test]
    fn positional_count_mismatch_is_rejected() {
        let error = normalize("a = ? AND b = ?", &Binds::positional([1]), &Quoting::mysql())
            .expect_err("mismatch");
        assert!(matches!(error, Error::Config(_)));
    }

    #[test]
    fn list_values_expand_inline() {
        let binds = Binds::new().bind("ids", Value::list([1, 2, 3]));
        let bound = normalize("id IN (:ids)", &binds, &Quoting::mysql()).expect("normalize");
        assert_eq!(bound.sql, "id IN (1, 2, 3)");
    }

    #[test]
    fn backslashes_close_nothing_under_standard_strings() {
        for quoting in [Quoting::postgres(), Quoting::sqlite()] {
            let bound = normalize(
                "SELECT * FROM f WHERE path = 'C:\\' AND id = ?",
                &Binds::positional([7]),
                &quoting,
            )
            .expect("the literal ends at its closing quote");
            assert_eq!(bound.sql, "SELECT * FROM f WHERE path = 'C:\\' AND id = ?");
            assert_eq!(bound.params, vec![Value::Int(7)]);

            let sql = inline_params("SELECT 'C:\\' , ?", &[Value::Int(7)], &quoting);
            assert_eq!(sql, "SELECT 'C:\\' , 7");
        }
    }

    #[test]
    fn backslashes_escape_quotes_in_mysql_strings() {
        let bound = normalize(
            "SELECT 'it\\'s ?', \"a\\\" ?\" WHERE id = ?",
            &Binds::positional([7]),
            &Quoting::mysql(),
        )
        .expect("only the trailing placeholder counts");
        assert_eq!(bound.params, vec![Value::Int(7)]);

        let sql = inline_params("SELECT 'C:\\\\', ?", &[Value::Int(7)], &Quoting::mysql());
        assert_eq!(sql, "SELECT 'C:\\\\', 7");
    }

    #[test]
    fn inline_params_quotes_each_value() {
        let sql = inline_params(
            "INSERT INTO t VALUES (?, ?)",
            &[Value::from("o'k"), Value::Null],
            &Quoting::postgres(),
        );
        assert_eq!(sql, "INSERT INTO t VALUES ('o''k', NULL)");
    }
}
