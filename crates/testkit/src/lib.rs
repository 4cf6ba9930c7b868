//! Test support for sqlbridge dialects: a recording fake connection for
//! driving the adapter without a server, and YAML-described DDL cases.

mod recording;
mod yaml_runner;

pub use recording::{RecordedCall, Recorder, RecordingConnection, RecordingDialect, rows};
pub use yaml_runner::{
    CaseColumn, CaseError, CaseForeignKey, CaseIndex, CaseOp, CaseTable, TestCase, TestResult,
    load_test_cases_from_path, load_test_cases_from_str, matches_flavor, render_statements,
    run_all, run_test,
};
