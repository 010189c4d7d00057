//! Audit entry persistence.
//!
//! Audit rows are append-only. The writer task hands over whole batches,
//! which are inserted with a single `UNNEST` statement per chunk inside a
//! transaction, so a chunk is either fully stored or not at all.

use chrono::{DateTime, Utc};
use citadel_types::{
    Action, AuditEntry, AuditEntryId, AuditOutcome, BlockPos, ClaimId, PlayerId, WorldId,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;

/// Most rows sent in one `UNNEST` insert.
const MAX_ROWS_PER_INSERT: usize = 100;

/// Operations on the `ctdl_audit` table.
pub struct AuditStore<'a> {
    pool: &'a PgPool,
}

impl<'a> AuditStore<'a> {
    /// Create a new audit store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Batch-insert audit entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the insert fails.
    pub async fn batch_insert(&self, entries: &[AuditEntry]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }

        for chunk in entries.chunks(MAX_ROWS_PER_INSERT) {
            let mut tx = self.pool.begin().await?;

            let len = chunk.len();
            let mut ids = Vec::with_capacity(len);
            let mut actors = Vec::with_capacity(len);
            let mut actions = Vec::with_capacity(len);
            let mut claim_ids: Vec<Option<Uuid>> = Vec::with_capacity(len);
            let mut worlds = Vec::with_capacity(len);
            let mut xs = Vec::with_capacity(len);
            let mut ys = Vec::with_capacity(len);
            let mut zs = Vec::with_capacity(len);
            let mut outcomes = Vec::with_capacity(len);
            let mut reasons: Vec<Option<String>> = Vec::with_capacity(len);
            let mut timestamps = Vec::with_capacity(len);

            for entry in chunk {
                ids.push(entry.id.into_inner());
                actors.push(entry.actor.into_inner());
                actions.push(entry.action.as_str());
                claim_ids.push(entry.claim_id.map(ClaimId::into_inner));
                worlds.push(i32::from(entry.position.world.0));
                xs.push(entry.position.x);
                ys.push(entry.position.y);
                zs.push(entry.position.z);
                outcomes.push(entry.outcome.as_str());
                reasons.push(entry.reason.clone());
                timestamps.push(entry.created_at);
            }

            sqlx::query(
                r"INSERT INTO ctdl_audit
                      (id, actor, action, claim_id, world_id, x, y, z, outcome, reason, created_at)
                  SELECT * FROM UNNEST(
                      $1::UUID[], $2::UUID[], $3::TEXT[], $4::UUID[],
                      $5::INTEGER[], $6::INTEGER[], $7::INTEGER[], $8::INTEGER[],
                      $9::TEXT[], $10::TEXT[], $11::TIMESTAMPTZ[])
                  ON CONFLICT (id) DO NOTHING",
            )
            .bind(&ids)
            .bind(&actors)
            .bind(&actions)
            .bind(&claim_ids)
            .bind(&worlds)
            .bind(&xs)
            .bind(&ys)
            .bind(&zs)
            .bind(&outcomes)
            .bind(&reasons)
            .bind(&timestamps)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
        }

        tracing::debug!(count = entries.len(), "Inserted audit entries (batch UNNEST)");
        Ok(())
    }

    /// The most recent entries for a claim, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the query fails, or
    /// [`StoreError::Corrupt`] if a row cannot be decoded.
    pub async fn for_claim(&self, id: ClaimId, limit: u32) -> Result<Vec<AuditEntry>, StoreError> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r"SELECT id, actor, action, claim_id, world_id, x, y, z, outcome, reason, created_at
              FROM ctdl_audit
              WHERE claim_id = $1
              ORDER BY created_at DESC, id DESC
              LIMIT $2",
        )
        .bind(id.into_inner())
        .bind(i64::from(limit))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(AuditRow::into_entry).collect()
    }
}

/// A row from the `ctdl_audit` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditRow {
    /// Entry ID.
    pub id: Uuid,
    /// Acting player.
    pub actor: Uuid,
    /// Action name.
    pub action: String,
    /// Claim at the position, if any.
    pub claim_id: Option<Uuid>,
    /// World number.
    pub world_id: i32,
    /// Block X.
    pub x: i32,
    /// Block Y.
    pub y: i32,
    /// Block Z.
    pub z: i32,
    /// Outcome name.
    pub outcome: String,
    /// Denial reason text.
    pub reason: Option<String>,
    /// When the decision was made.
    pub created_at: DateTime<Utc>,
}

impl AuditRow {
    /// Decode into a domain [`AuditEntry`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] for unknown action or outcome names
    /// or an out-of-range world number.
    pub fn into_entry(self) -> Result<AuditEntry, StoreError> {
        let action = Action::parse(&self.action)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown action {:?}", self.action)))?;
        let outcome = AuditOutcome::parse(&self.outcome)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown outcome {:?}", self.outcome)))?;
        let world = u16::try_from(self.world_id)
            .map_err(|e| StoreError::Corrupt(format!("world_id {}: {e}", self.world_id)))?;
        Ok(AuditEntry {
            id: AuditEntryId::from(self.id),
            actor: PlayerId::from(self.actor),
            action,
            claim_id: self.claim_id.map(ClaimId::from),
            position: BlockPos::new(WorldId(world), self.x, self.y, self.z),
            outcome,
            reason: self.reason,
            created_at: self.created_at,
        })
    }
}
