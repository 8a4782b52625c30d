//! The replicated database facade: one primary plus zero-or-more secondaries.
//!
//! Writes and transactions always target the primary (index 0). Reads are
//! spread round-robin across the secondaries, falling back to the primary
//! when none exist. Administrative operations (open, close, ping, prepare)
//! fan out concurrently to every replica via [`crate::scatter`].

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once, RwLock, RwLockReadGuard};
use std::time::Duration;

use sqlx::any::{Any, AnyArguments, AnyQueryResult, AnyRow};
use sqlx::AnyPool;
use sqlx::pool::PoolOptions;
use sqlx::query::{Query, QueryAs};
use sqlx::{Connection, Executor, FromRow, Statement};
use tracing::info;

use crate::error::DbError;
use crate::scatter::scatter;
use crate::statement::PreparedSet;
use crate::tx::Transaction;

static INSTALL_DRIVERS: Once = Once::new();

/// Connection settings for the replica set.
///
/// `hosts[0]` is the primary; any further hosts are read secondaries. Hosts
/// may be full connection URLs or bare addresses, in which case the driver
/// name is prepended as the URL scheme.
#[derive(Clone, Debug)]
pub struct DbConfig {
    pub driver: String,
    pub hosts: Vec<String>,
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
    pub conn_max_lifetime: Duration,
}

#[derive(Debug)]
struct Replicas {
    driver: String,
    pools: Vec<AnyPool>,
}

#[derive(Debug)]
struct Shared {
    /// Read-mostly; accessors take the read side so a future reconfiguration
    /// can swap the replica set without racing them.
    replicas: RwLock<Replicas>,
    /// Round-robin state for secondary selection. Owned by the instance so
    /// multiple routers (e.g. in tests) never interfere.
    counter: AtomicU64,
}

/// Handle to the replica set. Cheap to clone; all clones share the same
/// pools and round-robin counter.
#[derive(Clone, Debug)]
pub struct ReplicaDb {
    shared: Arc<Shared>,
}

fn connection_url(driver: &str, host: &str) -> String {
    if host.contains("://") || host.starts_with(&format!("{driver}:")) {
        host.to_string()
    } else {
        format!("{driver}://{host}")
    }
}

/// Bound a database operation by a deadline. On expiry the in-flight future
/// is dropped, which returns any checked-out connection to its pool.
pub(crate) async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, DbError>
where
    F: Future<Output = Result<T, DbError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(res) => res,
        Err(_) => Err(DbError::Timeout(deadline)),
    }
}

impl ReplicaDb {
    /// Concurrently open every configured replica.
    ///
    /// Validation happens before any connection attempt: an empty driver name
    /// or empty host list fails with [`DbError::Configuration`]. A failure on
    /// any replica aborts the whole open with [`DbError::Connection`].
    pub async fn open(config: &DbConfig) -> Result<Self, DbError> {
        let driver = config.driver.trim().to_string();
        if driver.is_empty() {
            return Err(DbError::Configuration(
                "database driver name should not be empty".into(),
            ));
        }
        if config.hosts.is_empty() {
            return Err(DbError::Configuration(
                "at least one database host is required".into(),
            ));
        }

        INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);

        let urls: Vec<String> = config
            .hosts
            .iter()
            .map(|host| connection_url(&driver, host))
            .collect();
        let max_open = config.max_open_conns.max(1);
        let min_idle = config.max_idle_conns.min(max_open);
        let lifetime = (config.conn_max_lifetime > Duration::ZERO)
            .then_some(config.conn_max_lifetime);

        // Legs report their connect outcome as a value so a failure on one
        // replica still leaves the successfully opened pools reachable for
        // cleanup below.
        let results = scatter(urls.len(), |idx| {
            let url = urls[idx].clone();
            async move {
                Ok(PoolOptions::<Any>::new()
                    .max_connections(max_open)
                    .min_connections(min_idle)
                    .max_lifetime(lifetime)
                    .connect(&url)
                    .await)
            }
        })
        .await?;

        let mut pools = Vec::with_capacity(results.len());
        let mut last_err = None;
        for res in results {
            match res {
                Ok(pool) => pools.push(pool),
                Err(e) => last_err = Some(e),
            }
        }
        if let Some(err) = last_err {
            scatter(pools.len(), |idx| {
                let pool = pools[idx].clone();
                async move {
                    pool.close().await;
                    Ok(())
                }
            })
            .await
            .ok();
            return Err(DbError::Connection(err));
        }

        info!(driver = %driver, replicas = pools.len(), "connected to database");

        Ok(Self {
            shared: Arc::new(Shared {
                replicas: RwLock::new(Replicas { driver, pools }),
                counter: AtomicU64::new(0),
            }),
        })
    }

    /// [`Self::open`] bounded by a deadline.
    pub async fn open_timeout(config: &DbConfig, deadline: Duration) -> Result<Self, DbError> {
        with_deadline(deadline, Self::open(config)).await
    }

    fn read_replicas(&self) -> RwLockReadGuard<'_, Replicas> {
        // No writer exists yet, so poisoning is unreachable; recover rather
        // than panic if that ever changes.
        self.shared
            .replicas
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Name of the configured driver.
    pub fn driver(&self) -> String {
        self.read_replicas().driver.clone()
    }

    /// Number of physical replicas, primary included.
    pub fn replica_count(&self) -> usize {
        self.read_replicas().pools.len()
    }

    /// The primary connection pool. Never fails once the set is open.
    pub fn primary(&self) -> AnyPool {
        self.read_replicas().pools[0].clone()
    }

    fn next_secondary(&self, count: usize) -> usize {
        if count <= 1 {
            return 0;
        }
        let n = self.shared.counter.fetch_add(1, Ordering::Relaxed);
        1 + (n % (count as u64 - 1)) as usize
    }

    /// Index of the replica the next non-transactional read goes to. With no
    /// secondaries this is always the primary (index 0).
    pub fn secondary_index(&self) -> usize {
        let count = self.read_replicas().pools.len();
        self.next_secondary(count)
    }

    /// A round-robin-selected secondary pool (the primary when the set has
    /// a single replica).
    pub fn secondary(&self) -> AnyPool {
        let replicas = self.read_replicas();
        let idx = self.next_secondary(replicas.pools.len());
        replicas.pools[idx].clone()
    }

    pub(crate) fn pool_at(&self, idx: usize) -> AnyPool {
        self.read_replicas().pools[idx].clone()
    }

    fn pools_snapshot(&self) -> Vec<AnyPool> {
        self.read_replicas().pools.to_vec()
    }

    /// Close all physical replicas concurrently, releasing open resources.
    pub async fn close(&self) -> Result<(), DbError> {
        let pools = self.pools_snapshot();
        scatter(pools.len(), |idx| {
            let pool = pools[idx].clone();
            async move {
                pool.close().await;
                Ok(())
            }
        })
        .await
        .map(|_| ())
    }

    /// [`Self::close`] bounded by a deadline.
    pub async fn close_timeout(&self, deadline: Duration) -> Result<(), DbError> {
        with_deadline(deadline, self.close()).await
    }

    /// Verify a connection to every replica is alive, establishing one if
    /// necessary.
    pub async fn ping(&self) -> Result<(), DbError> {
        let pools = self.pools_snapshot();
        scatter(pools.len(), |idx| {
            let pool = pools[idx].clone();
            async move {
                let mut conn = pool.acquire().await.map_err(DbError::Connection)?;
                conn.ping().await.map_err(DbError::Connection)
            }
        })
        .await
        .map(|_| ())
    }

    /// [`Self::ping`] bounded by a deadline.
    pub async fn ping_timeout(&self, deadline: Duration) -> Result<(), DbError> {
        with_deadline(deadline, self.ping()).await
    }

    /// Prepare `sql` on every replica concurrently. Either every replica
    /// prepares successfully or the whole set fails; partially prepared
    /// statements are released on failure.
    pub async fn prepare(&self, sql: &str) -> Result<PreparedSet, DbError> {
        let pools = self.pools_snapshot();
        let sql: Arc<str> = Arc::from(sql);
        let statements = scatter(pools.len(), |idx| {
            let pool = pools[idx].clone();
            let sql = Arc::clone(&sql);
            async move {
                let mut conn = pool.acquire().await.map_err(DbError::Statement)?;
                let stmt = (&mut *conn)
                    .prepare(sql.as_ref())
                    .await
                    .map_err(DbError::Statement)?;
                Ok(stmt.to_owned())
            }
        })
        .await?;
        Ok(PreparedSet::new(self.clone(), sql, statements))
    }

    /// [`Self::prepare`] bounded by a deadline.
    pub async fn prepare_timeout(
        &self,
        sql: &str,
        deadline: Duration,
    ) -> Result<PreparedSet, DbError> {
        with_deadline(deadline, self.prepare(sql)).await
    }

    /// Execute a statement without returning rows. Always targets the
    /// primary.
    pub async fn execute<'q>(
        &self,
        query: Query<'q, Any, AnyArguments<'q>>,
    ) -> Result<AnyQueryResult, DbError> {
        let pool = self.primary();
        query.execute(&pool).await.map_err(DbError::Statement)
    }

    /// [`Self::execute`] bounded by a deadline.
    pub async fn execute_timeout<'q>(
        &self,
        query: Query<'q, Any, AnyArguments<'q>>,
        deadline: Duration,
    ) -> Result<AnyQueryResult, DbError> {
        with_deadline(deadline, self.execute(query)).await
    }

    /// Fetch all rows for a read-only query from a round-robin-selected
    /// secondary.
    pub async fn fetch_all<'q, T>(
        &self,
        query: QueryAs<'q, Any, T, AnyArguments<'q>>,
    ) -> Result<Vec<T>, DbError>
    where
        T: Send + Unpin + for<'r> FromRow<'r, AnyRow>,
    {
        let pool = self.secondary();
        query.fetch_all(&pool).await.map_err(DbError::Statement)
    }

    /// [`Self::fetch_all`] bounded by a deadline.
    pub async fn fetch_all_timeout<'q, T>(
        &self,
        query: QueryAs<'q, Any, T, AnyArguments<'q>>,
        deadline: Duration,
    ) -> Result<Vec<T>, DbError>
    where
        T: Send + Unpin + for<'r> FromRow<'r, AnyRow>,
    {
        with_deadline(deadline, self.fetch_all(query)).await
    }

    /// Fetch at most one row from a round-robin-selected secondary.
    pub async fn fetch_optional<'q, T>(
        &self,
        query: QueryAs<'q, Any, T, AnyArguments<'q>>,
    ) -> Result<Option<T>, DbError>
    where
        T: Send + Unpin + for<'r> FromRow<'r, AnyRow>,
    {
        let pool = self.secondary();
        query.fetch_optional(&pool).await.map_err(DbError::Statement)
    }

    /// [`Self::fetch_optional`] bounded by a deadline.
    pub async fn fetch_optional_timeout<'q, T>(
        &self,
        query: QueryAs<'q, Any, T, AnyArguments<'q>>,
        deadline: Duration,
    ) -> Result<Option<T>, DbError>
    where
        T: Send + Unpin + for<'r> FromRow<'r, AnyRow>,
    {
        with_deadline(deadline, self.fetch_optional(query)).await
    }

    /// Start a transaction on the primary with the driver's default
    /// isolation level.
    pub async fn begin(&self) -> Result<Transaction, DbError> {
        let pool = self.primary();
        let tx = pool.begin().await.map_err(DbError::TransactionBegin)?;
        Ok(Transaction::new(tx))
    }

    /// [`Self::begin`] bounded by a deadline.
    pub async fn begin_timeout(&self, deadline: Duration) -> Result<Transaction, DbError> {
        with_deadline(deadline, self.begin()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::sqlite_config;
    use sqlx::Row;

    #[derive(Debug, PartialEq)]
    struct KvRow {
        k: String,
        v: i64,
    }

    impl<'r> FromRow<'r, AnyRow> for KvRow {
        fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
            Ok(Self {
                k: row.try_get("k")?,
                v: row.try_get("v")?,
            })
        }
    }

    #[tokio::test]
    async fn open_rejects_empty_driver() {
        let cfg = DbConfig {
            driver: "  ".into(),
            hosts: vec!["sqlite::memory:".into()],
            max_open_conns: 1,
            max_idle_conns: 1,
            conn_max_lifetime: Duration::ZERO,
        };
        let err = ReplicaDb::open(&cfg).await.expect_err("must fail");
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn open_rejects_empty_host_list() {
        let cfg = DbConfig {
            driver: "sqlite".into(),
            hosts: vec![],
            max_open_conns: 1,
            max_idle_conns: 1,
            conn_max_lifetime: Duration::ZERO,
        };
        let err = ReplicaDb::open(&cfg).await.expect_err("must fail");
        assert!(err.is_configuration());
    }

    #[test]
    fn connection_url_prepends_driver_for_bare_hosts() {
        assert_eq!(connection_url("sqlite", "/tmp/a.db"), "sqlite:///tmp/a.db");
        assert_eq!(
            connection_url("mysql", "mysql://u@h/db"),
            "mysql://u@h/db"
        );
        assert_eq!(connection_url("sqlite", "sqlite::memory:"), "sqlite::memory:");
    }

    #[tokio::test]
    async fn single_replica_reads_go_to_primary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = ReplicaDb::open(&sqlite_config(&dir, 1)).await.expect("open");
        assert_eq!(db.replica_count(), 1);
        for _ in 0..10 {
            assert_eq!(db.secondary_index(), 0);
        }
    }

    #[tokio::test]
    async fn secondary_picks_cycle_round_robin() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = ReplicaDb::open(&sqlite_config(&dir, 3)).await.expect("open");
        assert_eq!(db.replica_count(), 3);

        let picks: Vec<usize> = (0..10).map(|_| db.secondary_index()).collect();
        assert_eq!(picks, vec![1, 2, 1, 2, 1, 2, 1, 2, 1, 2]);
        assert_eq!(picks.iter().filter(|&&i| i == 1).count(), 5);
        assert_eq!(picks.iter().filter(|&&i| i == 2).count(), 5);
        // Index 0 is never chosen while secondaries exist.
        assert!(picks.iter().all(|&i| i != 0));
    }

    #[tokio::test]
    async fn writes_on_primary_are_visible_to_secondary_reads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = ReplicaDb::open(&sqlite_config(&dir, 3)).await.expect("open");

        db.execute(sqlx::query("CREATE TABLE kv (k TEXT NOT NULL, v INTEGER NOT NULL)"))
            .await
            .expect("create table");
        db.execute(sqlx::query("INSERT INTO kv (k, v) VALUES (?, ?)").bind("a").bind(1_i64))
            .await
            .expect("insert");

        let rows: Vec<KvRow> = db
            .fetch_all(sqlx::query_as::<Any, KvRow>("SELECT k, v FROM kv"))
            .await
            .expect("select");
        assert_eq!(rows, vec![KvRow { k: "a".into(), v: 1 }]);

        let one: Option<KvRow> = db
            .fetch_optional(sqlx::query_as::<Any, KvRow>("SELECT k, v FROM kv WHERE k = ?").bind("missing"))
            .await
            .expect("select one");
        assert!(one.is_none());
    }

    #[tokio::test]
    async fn ping_succeeds_then_fails_after_close() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = ReplicaDb::open(&sqlite_config(&dir, 2)).await.expect("open");
        db.ping().await.expect("ping while open");
        db.ping_timeout(Duration::from_secs(5)).await.expect("ping with deadline");

        db.close().await.expect("close");
        assert!(db.ping().await.is_err());
    }

    #[tokio::test]
    async fn open_and_close_have_deadline_variants() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = ReplicaDb::open_timeout(&sqlite_config(&dir, 2), Duration::from_secs(5))
            .await
            .expect("open");
        db.ping().await.expect("ping while open");
        db.close_timeout(Duration::from_secs(5))
            .await
            .expect("close");
        assert!(db.ping().await.is_err());
    }

    #[tokio::test]
    async fn open_fails_as_a_whole_when_one_replica_is_unreachable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let good = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("good.db").display()
        );
        // No create mode and no file on disk, so this replica cannot open.
        let bad = format!(
            "sqlite://{}?mode=ro",
            dir.path().join("missing.db").display()
        );
        let cfg = DbConfig {
            driver: "sqlite".into(),
            hosts: vec![good, bad],
            max_open_conns: 1,
            max_idle_conns: 1,
            conn_max_lifetime: Duration::ZERO,
        };
        let err = ReplicaDb::open(&cfg).await.expect_err("open must fail");
        assert!(matches!(err, DbError::Connection(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_aborts_a_slow_operation() {
        let res = with_deadline(Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, DbError>(())
        })
        .await;
        assert!(matches!(res, Err(DbError::Timeout(_))));
    }
}
