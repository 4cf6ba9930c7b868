use std::fmt::Write as _;
use std::io::Write;
use std::time::Duration;

use crate::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Connect,
    Query,
    Transaction,
}

impl QueryKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Query => "QUERY",
            Self::Transaction => "TRANSACTION",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryEvent<'a> {
    pub kind: QueryKind,
    pub sql: &'a str,
    pub params: &'a [Value],
    pub elapsed: Duration,
}

/// Receives timing events when profiling is enabled.
pub trait QuerySink: Send {
    fn record(&mut self, event: &QueryEvent<'_>);
}

/// Writes one line per event to any writer. Write failures are ignored.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> QuerySink for WriterSink<W> {
    fn record(&mut self, event: &QueryEvent<'_>) {
        let mut line = format!(
            "## {} {:.4}s: {}",
            event.kind.as_str(),
            event.elapsed.as_secs_f64(),
            event.sql
        );
        if !event.params.is_empty() {
            let params = event
                .params
                .iter()
                .map(|value| value.to_text().unwrap_or_else(|| "NULL".to_string()))
                .collect::<Vec<_>>();
            write!(line, " BIND: [{}]", params.join(", "))
                .expect("writing to String should not fail");
        }
        let _ = writeln!(self.writer, "{line}");
    }
}
