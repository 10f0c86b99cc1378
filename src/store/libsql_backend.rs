//! libSQL backend: durable `SessionStore` implementation.
//!
//! Supports local file and in-memory databases. The sequencer state is kept
//! as a JSON document next to its revision; profiles get one column per
//! field.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Transaction, params};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::intake::{Language, SequencerState, UserProfile};
use crate::store::migrations;
use crate::store::traits::SessionStore;

/// libSQL session store.
///
/// Holds a single connection reused for all operations. Access is
/// serialized so that reads never observe another turn's open transaction.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    conn_lock: Mutex<()>,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db)?;
        migrations::run_migrations(&store.conn).await?;
        info!(path = %path.display(), "Session store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests and throwaway runs).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to create in-memory database: {e}")))?;

        let store = Self::from_database(db)?;
        migrations::run_migrations(&store.conn).await?;
        Ok(store)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, StoreError> {
        let conn = db
            .connect()
            .map_err(|e| StoreError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            conn_lock: Mutex::new(()),
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// The writes of one turn, run inside an open transaction.
    async fn write_turn(
        tx: &Transaction,
        state: &SequencerState,
        profile: Option<&UserProfile>,
        expected_revision: Option<u64>,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let state_json = serde_json::to_string(state)
            .map_err(|e| StoreError::Serialization(format!("sequencer state: {e}")))?;
        let revision = revision_to_db(state.revision)?;

        let written = match expected_revision {
            None => tx
                .execute(
                    "INSERT INTO sequencer_states (conversation_id, revision, flow, state, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (conversation_id) DO NOTHING",
                    params![
                        state.conversation_id.as_str(),
                        revision,
                        state.flow.to_string(),
                        state_json,
                        now.as_str()
                    ],
                )
                .await
                .map_err(|e| StoreError::Query(format!("insert_state: {e}")))?,
            Some(expected) => tx
                .execute(
                    "UPDATE sequencer_states SET revision = ?2, flow = ?3, state = ?4, updated_at = ?5
                     WHERE conversation_id = ?1 AND revision = ?6",
                    params![
                        state.conversation_id.as_str(),
                        revision,
                        state.flow.to_string(),
                        state_json,
                        now.as_str(),
                        revision_to_db(expected)?
                    ],
                )
                .await
                .map_err(|e| StoreError::Query(format!("update_state: {e}")))?,
        };

        if written == 0 {
            return Err(StoreError::Conflict {
                conversation_id: state.conversation_id.clone(),
                expected: expected_revision,
            });
        }

        if let Some(profile) = profile {
            let completed_at = opt_text_owned(profile.completed_at.map(|t| t.to_rfc3339()));
            tx.execute(
                "INSERT INTO user_profiles
                    (conversation_id, language, name, county, subcounty, ward, completed_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT (conversation_id) DO UPDATE SET
                    language = ?2, name = ?3, county = ?4, subcounty = ?5, ward = ?6,
                    completed_at = ?7, updated_at = ?8",
                params![
                    state.conversation_id.as_str(),
                    profile.language.code(),
                    profile.name.as_str(),
                    profile.county.as_str(),
                    profile.subcounty.as_str(),
                    profile.ward.as_str(),
                    completed_at,
                    now.as_str()
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("upsert_profile: {e}")))?;
        }

        Ok(())
    }
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn revision_to_db(revision: u64) -> Result<i64, StoreError> {
    i64::try_from(revision)
        .map_err(|_| StoreError::Serialization(format!("revision {revision} out of range")))
}

/// Parse an RFC 3339 timestamp written by this store.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("timestamp {s}: {e}")))
}

fn row_to_profile(row: &libsql::Row) -> Result<UserProfile, StoreError> {
    let get_str = |idx: i32| -> Result<String, StoreError> {
        row.get::<String>(idx)
            .map_err(|e| StoreError::Query(format!("profile column {idx}: {e}")))
    };

    let code = get_str(0)?;
    let language = Language::from_code(&code)
        .ok_or_else(|| StoreError::Serialization(format!("unknown language code {code}")))?;
    let completed_at_str: Option<String> = row.get(5).ok();
    let completed_at = completed_at_str
        .map(|s| parse_datetime(&s))
        .transpose()?;

    Ok(UserProfile {
        language,
        name: get_str(1)?,
        county: get_str(2)?,
        subcounty: get_str(3)?,
        ward: get_str(4)?,
        completed_at,
    })
}

#[async_trait]
impl SessionStore for LibSqlStore {
    async fn load_state(&self, conversation_id: &str) -> Result<Option<SequencerState>, StoreError> {
        let _guard = self.conn_lock.lock().await;
        let mut rows = self
            .conn()
            .query(
                "SELECT state FROM sequencer_states WHERE conversation_id = ?1",
                params![conversation_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("load_state: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let json: String = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("load_state: {e}")))?;
                let state = serde_json::from_str(&json)
                    .map_err(|e| StoreError::Serialization(format!("sequencer state: {e}")))?;
                Ok(Some(state))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("load_state: {e}"))),
        }
    }

    async fn load_profile(&self, conversation_id: &str) -> Result<Option<UserProfile>, StoreError> {
        let _guard = self.conn_lock.lock().await;
        let mut rows = self
            .conn()
            .query(
                "SELECT language, name, county, subcounty, ward, completed_at
                 FROM user_profiles WHERE conversation_id = ?1",
                params![conversation_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("load_profile: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_profile(&row).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("load_profile: {e}"))),
        }
    }

    async fn commit_turn(
        &self,
        state: &SequencerState,
        profile: Option<&UserProfile>,
        expected_revision: Option<u64>,
    ) -> Result<(), StoreError> {
        let _guard = self.conn_lock.lock().await;

        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| StoreError::Query(format!("begin: {e}")))?;

        match Self::write_turn(&tx, state, profile, expected_revision).await {
            Ok(()) => {
                tx.commit()
                    .await
                    .map_err(|e| StoreError::Query(format!("commit: {e}")))?;
                debug!(
                    conversation_id = %state.conversation_id,
                    revision = state.revision,
                    with_profile = profile.is_some(),
                    "Turn committed"
                );
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!("Rollback failed after {e}: {rollback}");
                }
                Err(e)
            }
        }
    }
}
