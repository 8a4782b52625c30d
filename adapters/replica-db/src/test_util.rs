//! Shared fixtures for the crate's tests.

use std::time::Duration;

use crate::db::DbConfig;

/// A replica set of `replicas` sqlite pools all pointing at the same
/// temp-dir file, which makes primary writes visible to secondary reads.
pub(crate) fn sqlite_config(dir: &tempfile::TempDir, replicas: usize) -> DbConfig {
    let path = dir.path().join("replica.db");
    let url = format!("sqlite://{}?mode=rwc", path.display());
    DbConfig {
        driver: "sqlite".into(),
        hosts: vec![url; replicas],
        max_open_conns: 5,
        max_idle_conns: 1,
        conn_max_lifetime: Duration::ZERO,
    }
}
