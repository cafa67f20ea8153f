//! libSQL backend — async `RecordRepository` implementation.
//!
//! Supports local file and in-memory databases. Record creation runs in a
//! single transaction so a submission is written entirely or not at all.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{
    Address, NewRecord, Payment, PersistedRecord, RecordCounts, RecordRepository, User,
};
use crate::wizard::model::SubscriptionType;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations. Access is
/// serialized through `lock` so that one submission's transaction never
/// interleaves with another statement on the same connection.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    lock: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            lock: Mutex::new(()),
        })
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Map an insert failure, recognizing UNIQUE violations by their column.
fn insert_error(op: &str, e: libsql::Error) -> DatabaseError {
    let message = e.to_string();
    if let Some(rest) = message.split("UNIQUE constraint failed: ").nth(1) {
        let qualified: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '.')
            .collect();
        let column = qualified.rsplit('.').next().unwrap_or_default().to_string();
        return DatabaseError::UniqueViolation { column };
    }
    DatabaseError::Query(format!("{op}: {message}"))
}

const USER_COLUMNS: &str = "id, name, email, phone, subscription_type, created_at";

const ADDRESS_COLUMNS: &str =
    "id, user_id, address_line1, address_line2, city, postal_code, state, country";

const PAYMENT_COLUMNS: &str = "id, user_id, credit_card_number, expiration_date, cvv";

fn row_to_user(row: &libsql::Row) -> Result<User, DatabaseError> {
    let map = |e: libsql::Error| DatabaseError::Query(format!("user row parse: {e}"));
    let subscription: String = row.get(4).map_err(map)?;
    let subscription_type: SubscriptionType = subscription
        .parse()
        .map_err(|e| DatabaseError::Serialization(format!("{e}")))?;
    let created_at: String = row.get(5).map_err(map)?;
    Ok(User {
        id: row.get(0).map_err(map)?,
        name: row.get(1).map_err(map)?,
        email: row.get(2).map_err(map)?,
        phone: row.get(3).map_err(map)?,
        subscription_type,
        created_at: parse_datetime(&created_at),
    })
}

fn row_to_address(row: &libsql::Row) -> Result<Address, libsql::Error> {
    Ok(Address {
        id: row.get(0)?,
        user_id: row.get(1)?,
        address_line1: row.get(2)?,
        address_line2: row.get::<String>(3).ok(),
        city: row.get(4)?,
        postal_code: row.get(5)?,
        state: row.get(6)?,
        country: row.get(7)?,
    })
}

fn row_to_payment(row: &libsql::Row) -> Result<Payment, libsql::Error> {
    Ok(Payment {
        id: row.get(0)?,
        user_id: row.get(1)?,
        credit_card_number: row.get(2)?,
        expiration_date: row.get(3)?,
        cvv: row.get(4)?,
    })
}

/// Row ids produced by one record insert.
struct InsertedIds {
    user: i64,
    address: i64,
    payment: Option<i64>,
}

/// Insert the whole record graph on `conn`. Caller owns the transaction.
async fn insert_graph(
    conn: &Connection,
    record: &NewRecord,
    created_at: &str,
) -> Result<InsertedIds, DatabaseError> {
    conn.execute(
        "INSERT INTO users (name, email, phone, subscription_type, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.name.as_str(),
            record.email.as_str(),
            record.phone.as_str(),
            record.subscription_type.as_str(),
            created_at,
        ],
    )
    .await
    .map_err(|e| insert_error("insert_user", e))?;
    let user = conn.last_insert_rowid();

    conn.execute(
        "INSERT INTO addresses (user_id, address_line1, address_line2, city, postal_code, state, country) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user,
            record.address_line1.as_str(),
            opt_text(record.address_line2.as_deref()),
            record.city.as_str(),
            record.postal_code.as_str(),
            record.state.as_str(),
            record.country.as_str(),
        ],
    )
    .await
    .map_err(|e| insert_error("insert_address", e))?;
    let address = conn.last_insert_rowid();

    let payment = match &record.payment {
        Some(payment) => {
            conn.execute(
                "INSERT INTO payments (user_id, credit_card_number, expiration_date, cvv) VALUES (?1, ?2, ?3, ?4)",
                params![
                    user,
                    payment.credit_card_number.as_str(),
                    payment.expiration_date.as_str(),
                    payment.cvv.as_str(),
                ],
            )
            .await
            .map_err(|e| insert_error("insert_payment", e))?;
            Some(conn.last_insert_rowid())
        }
        None => None,
    };

    Ok(InsertedIds {
        user,
        address,
        payment,
    })
}

fn count_from_row(row: &libsql::Row, table: &str) -> Result<u64, DatabaseError> {
    row.get::<i64>(0)
        .map(|count| count as u64)
        .map_err(|e| DatabaseError::Query(format!("count {table}: {e}")))
}

async fn count_rows(conn: &Connection, table: &str) -> Result<u64, DatabaseError> {
    let mut rows = conn
        .query(&format!("SELECT COUNT(*) FROM {table}"), ())
        .await
        .map_err(|e| DatabaseError::Query(format!("count {table}: {e}")))?;
    match rows.next().await {
        Ok(Some(row)) => count_from_row(&row, table),
        Ok(None) => Ok(0),
        Err(e) => Err(DatabaseError::Query(format!("count {table}: {e}"))),
    }
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl RecordRepository for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        self.conn()
            .execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to enable foreign keys: {e}")))?;
        migrations::run_migrations(self.conn()).await
    }

    async fn email_exists(&self, email: &str) -> Result<bool, DatabaseError> {
        let _guard = self.lock.lock().await;
        let mut rows = self
            .conn()
            .query("SELECT 1 FROM users WHERE email = ?1 LIMIT 1", params![email])
            .await
            .map_err(|e| DatabaseError::Query(format!("email_exists: {e}")))?;

        match rows.next().await {
            Ok(Some(_)) => Ok(true),
            Ok(None) => Ok(false),
            Err(e) => Err(DatabaseError::Query(format!("email_exists: {e}"))),
        }
    }

    async fn create_record(&self, record: &NewRecord) -> Result<PersistedRecord, DatabaseError> {
        let _guard = self.lock.lock().await;
        let created_at = Utc::now();
        let created_at_str = created_at.to_rfc3339();

        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("begin transaction: {e}")))?;

        let ids = match insert_graph(&tx, record, &created_at_str).await {
            Ok(ids) => ids,
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Rollback after failed record insert failed");
                }
                debug!(error = %e, "Record insert rolled back");
                return Err(e);
            }
        };

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("commit: {e}")))?;

        debug!(
            user_id = ids.user,
            with_payment = ids.payment.is_some(),
            "Record committed"
        );

        Ok(PersistedRecord {
            user: User {
                id: ids.user,
                name: record.name.clone(),
                email: record.email.clone(),
                phone: record.phone.clone(),
                subscription_type: record.subscription_type,
                created_at: parse_datetime(&created_at_str),
            },
            address: Address {
                id: ids.address,
                user_id: ids.user,
                address_line1: record.address_line1.clone(),
                address_line2: record.address_line2.clone(),
                city: record.city.clone(),
                postal_code: record.postal_code.clone(),
                state: record.state.clone(),
                country: record.country.clone(),
            },
            payment: record.payment.as_ref().zip(ids.payment).map(|(p, id)| Payment {
                id,
                user_id: ids.user,
                credit_card_number: p.credit_card_number.clone(),
                expiration_date: p.expiration_date.clone(),
                cvv: p.cvv.clone(),
            }),
        })
    }

    async fn get_record(&self, user_id: i64) -> Result<Option<PersistedRecord>, DatabaseError> {
        let _guard = self.lock.lock().await;
        let conn = self.conn();

        let mut rows = conn
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user: {e}")))?;
        let user = match rows.next().await {
            Ok(Some(row)) => row_to_user(&row)?,
            Ok(None) => return Ok(None),
            Err(e) => return Err(DatabaseError::Query(format!("get_user: {e}"))),
        };

        let mut rows = conn
            .query(
                &format!("SELECT {ADDRESS_COLUMNS} FROM addresses WHERE user_id = ?1"),
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_address: {e}")))?;
        let address = match rows.next().await {
            Ok(Some(row)) => row_to_address(&row)
                .map_err(|e| DatabaseError::Query(format!("get_address row parse: {e}")))?,
            Ok(None) => {
                return Err(DatabaseError::Query(format!(
                    "get_address: user {user_id} has no address"
                )));
            }
            Err(e) => return Err(DatabaseError::Query(format!("get_address: {e}"))),
        };

        let mut rows = conn
            .query(
                &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE user_id = ?1"),
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_payment: {e}")))?;
        let payment = match rows.next().await {
            Ok(Some(row)) => Some(
                row_to_payment(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_payment row parse: {e}")))?,
            ),
            Ok(None) => None,
            Err(e) => return Err(DatabaseError::Query(format!("get_payment: {e}"))),
        };

        Ok(Some(PersistedRecord {
            user,
            address,
            payment,
        }))
    }

    async fn record_counts(&self) -> Result<RecordCounts, DatabaseError> {
        let _guard = self.lock.lock().await;
        let conn = self.conn();
        Ok(RecordCounts {
            users: count_rows(conn, "users").await?,
            addresses: count_rows(conn, "addresses").await?,
            payments: count_rows(conn, "payments").await?,
        })
    }
}
