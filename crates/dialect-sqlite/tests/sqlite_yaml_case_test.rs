use std::path::PathBuf;

use sqlbridge_dialect_sqlite::SqliteDialect;
use sqlbridge_testkit::{TestResult, load_test_cases_from_path, run_all, run_test};

fn cases(relative: &str) -> std::collections::BTreeMap<String, sqlbridge_testkit::TestCase> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../tests")
        .join(relative);
    load_test_cases_from_path(&path)
        .unwrap_or_else(|error| panic!("failed to load cases '{}': {error}", path.display()))
}

#[test]
fn sqlite_ddl_cases_pass() {
    let failures = run_all(&SqliteDialect, &cases("sqlite/ddl.yml"));
    assert!(failures.is_empty(), "failing cases:\n{}", failures.join("\n"));
}

#[test]
fn shared_validation_cases_skip_other_flavors() {
    let cases = cases("common/validation.yml");
    let failures = run_all(&SqliteDialect, &cases);
    assert!(failures.is_empty(), "failing cases:\n{}", failures.join("\n"));

    assert!(matches!(
        run_test(&SqliteDialect, &cases["truncate_everywhere_but_sqlite"]),
        TestResult::Skipped(_)
    ));
}
