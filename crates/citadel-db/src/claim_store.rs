//! `PostgreSQL` implementation of [`ClaimStore`].
//!
//! A claim row and its access rows are always written in one transaction.
//! Updates delete and rewrite the access rows, so the stored set always
//! matches the claim exactly. Chunk queries derive chunk columns from the
//! stored bounds with arithmetic shifts, matching the index's `>> 4`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use citadel_types::{
    AccessRecord, AccessSubject, AuditEntry, Bounds, ChunkPos, Claim, ClaimId, GroupId,
    PermissionSet, PlayerId, Reinforcement, WorldId,
};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::audit_store::AuditStore;
use crate::error::StoreError;
use crate::store::ClaimStore;

/// SQLSTATE for a unique constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

const CLAIM_COLUMNS: &str = "id, group_id, world_id, min_x, min_y, min_z, max_x, max_y, max_z, \
     reinforcement_type, health, insecure, created_at, refreshed_at";

const ACCESS_COLUMNS: &str = "claim_id, ordinal, subject_kind, subject_id, can_build, \
     can_container, can_door, can_interact, can_manage";

/// Claim storage backed by a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PgClaimStore {
    pool: PgPool,
}

impl PgClaimStore {
    /// Create a store over a connected pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn access_for(
        &self,
        claim_ids: Option<&[Uuid]>,
    ) -> Result<HashMap<Uuid, Vec<AccessRecord>>, StoreError> {
        let rows = match claim_ids {
            Some(ids) => {
                sqlx::query_as::<_, AccessRow>(&format!(
                    "SELECT {ACCESS_COLUMNS} FROM ctdl_access_records \
                     WHERE claim_id = ANY($1) ORDER BY claim_id, ordinal"
                ))
                .bind(ids)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, AccessRow>(&format!(
                    "SELECT {ACCESS_COLUMNS} FROM ctdl_access_records ORDER BY claim_id, ordinal"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut by_claim: HashMap<Uuid, Vec<AccessRecord>> = HashMap::new();
        for row in rows {
            let claim_id = row.claim_id;
            by_claim.entry(claim_id).or_default().push(row.into_record()?);
        }
        Ok(by_claim)
    }

    async fn assemble(&self, rows: Vec<ClaimRow>, all: bool) -> Result<Vec<Claim>, StoreError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let mut access = if all {
            self.access_for(None).await?
        } else {
            let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
            self.access_for(Some(&ids)).await?
        };
        rows.into_iter()
            .map(|row| {
                let records = access.remove(&row.id).unwrap_or_default();
                row.into_claim(records)
            })
            .collect()
    }
}

async fn write_access(conn: &mut PgConnection, claim: &Claim) -> Result<(), StoreError> {
    if claim.access.is_empty() {
        return Ok(());
    }

    let len = claim.access.len();
    let mut ordinals = Vec::with_capacity(len);
    let mut kinds = Vec::with_capacity(len);
    let mut subjects = Vec::with_capacity(len);
    let mut build = Vec::with_capacity(len);
    let mut container = Vec::with_capacity(len);
    let mut door = Vec::with_capacity(len);
    let mut interact = Vec::with_capacity(len);
    let mut manage = Vec::with_capacity(len);

    for (ordinal, record) in claim.access.iter().enumerate() {
        ordinals.push(i32::try_from(ordinal).unwrap_or(i32::MAX));
        kinds.push(record.subject.kind_str());
        subjects.push(record.subject.uuid());
        build.push(record.permissions.build);
        container.push(record.permissions.container);
        door.push(record.permissions.door);
        interact.push(record.permissions.interact);
        manage.push(record.permissions.manage);
    }

    sqlx::query(&format!(
        "INSERT INTO ctdl_access_records ({ACCESS_COLUMNS}) \
         SELECT $1::UUID, * FROM UNNEST($2::INTEGER[], $3::TEXT[], $4::UUID[], \
         $5::BOOLEAN[], $6::BOOLEAN[], $7::BOOLEAN[], $8::BOOLEAN[], $9::BOOLEAN[])"
    ))
    .bind(claim.id.into_inner())
    .bind(&ordinals)
    .bind(&kinds)
    .bind(&subjects)
    .bind(&build)
    .bind(&container)
    .bind(&door)
    .bind(&interact)
    .bind(&manage)
    .execute(conn)
    .await?;

    Ok(())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

#[async_trait]
impl ClaimStore for PgClaimStore {
    async fn insert_claim(&self, claim: &Claim) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let b = &claim.bounds;

        let inserted = sqlx::query(&format!(
            "INSERT INTO ctdl_claims ({CLAIM_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        ))
        .bind(claim.id.into_inner())
        .bind(claim.group_id.into_inner())
        .bind(i32::from(b.world.0))
        .bind(b.min_x)
        .bind(b.min_y)
        .bind(b.min_z)
        .bind(b.max_x)
        .bind(b.max_y)
        .bind(b.max_z)
        .bind(i32::from(claim.reinforcement.type_id))
        .bind(i64::from(claim.reinforcement.health))
        .bind(claim.reinforcement.insecure)
        .bind(claim.created_at)
        .bind(claim.refreshed_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => return Err(StoreError::Duplicate(claim.id)),
            Err(err) => return Err(err.into()),
        }

        write_access(&mut tx, claim).await?;
        tx.commit().await?;

        tracing::debug!(claim = %claim.id, records = claim.access.len(), "Inserted claim");
        Ok(())
    }

    async fn update_claim(&self, claim: &Claim) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r"UPDATE ctdl_claims
              SET group_id = $2, reinforcement_type = $3, health = $4,
                  insecure = $5, refreshed_at = $6
              WHERE id = $1",
        )
        .bind(claim.id.into_inner())
        .bind(claim.group_id.into_inner())
        .bind(i32::from(claim.reinforcement.type_id))
        .bind(i64::from(claim.reinforcement.health))
        .bind(claim.reinforcement.insecure)
        .bind(claim.refreshed_at)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(claim.id));
        }

        sqlx::query("DELETE FROM ctdl_access_records WHERE claim_id = $1")
            .bind(claim.id.into_inner())
            .execute(&mut *tx)
            .await?;
        write_access(&mut tx, claim).await?;
        tx.commit().await?;

        tracing::debug!(claim = %claim.id, "Updated claim");
        Ok(())
    }

    async fn delete_claim(&self, id: ClaimId) -> Result<bool, StoreError> {
        let deleted = sqlx::query("DELETE FROM ctdl_claims WHERE id = $1")
            .bind(id.into_inner())
            .execute(&self.pool)
            .await?;
        Ok(deleted.rows_affected() > 0)
    }

    async fn load_all(&self) -> Result<Vec<Claim>, StoreError> {
        let rows = sqlx::query_as::<_, ClaimRow>(&format!(
            "SELECT {CLAIM_COLUMNS} FROM ctdl_claims ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        self.assemble(rows, true).await
    }

    async fn load_chunk(&self, chunk: ChunkPos) -> Result<Vec<Claim>, StoreError> {
        let rows = sqlx::query_as::<_, ClaimRow>(&format!(
            "SELECT {CLAIM_COLUMNS} FROM ctdl_claims \
             WHERE world_id = $1 \
               AND (min_x >> 4) <= $2 AND (max_x >> 4) >= $2 \
               AND (min_z >> 4) <= $3 AND (max_z >> 4) >= $3 \
             ORDER BY id"
        ))
        .bind(i32::from(chunk.world.0))
        .bind(chunk.x)
        .bind(chunk.z)
        .fetch_all(&self.pool)
        .await?;
        self.assemble(rows, false).await
    }

    async fn populated_chunks(&self) -> Result<Vec<ChunkPos>, StoreError> {
        let rows: Vec<(i32, i32, i32)> = sqlx::query_as(
            r"SELECT DISTINCT c.world_id, cx, cz
              FROM ctdl_claims c,
                   generate_series(c.min_x >> 4, c.max_x >> 4) AS cx,
                   generate_series(c.min_z >> 4, c.max_z >> 4) AS cz
              ORDER BY c.world_id, cx, cz",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(world, x, z)| Ok(ChunkPos::new(decode_world(world)?, x, z)))
            .collect()
    }

    async fn append_audit(&self, entries: &[AuditEntry]) -> Result<(), StoreError> {
        AuditStore::new(&self.pool).batch_insert(entries).await
    }

    async fn audit_for_claim(
        &self,
        id: ClaimId,
        limit: u32,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        AuditStore::new(&self.pool).for_claim(id, limit).await
    }
}

fn decode_world(raw: i32) -> Result<WorldId, StoreError> {
    u16::try_from(raw)
        .map(WorldId)
        .map_err(|e| StoreError::Corrupt(format!("world_id {raw}: {e}")))
}

/// A row from the `ctdl_claims` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClaimRow {
    /// Claim ID.
    pub id: Uuid,
    /// Owning group.
    pub group_id: Uuid,
    /// World number.
    pub world_id: i32,
    /// Inclusive lower X.
    pub min_x: i32,
    /// Inclusive lower Y.
    pub min_y: i32,
    /// Inclusive lower Z.
    pub min_z: i32,
    /// Inclusive upper X.
    pub max_x: i32,
    /// Inclusive upper Y.
    pub max_y: i32,
    /// Inclusive upper Z.
    pub max_z: i32,
    /// Reinforcement type ID.
    pub reinforcement_type: i32,
    /// Remaining health.
    pub health: i64,
    /// Whether host automation may reach the claim's containers.
    pub insecure: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last reinforcement time.
    pub refreshed_at: DateTime<Utc>,
}

impl ClaimRow {
    /// Decode into a domain [`Claim`] carrying `access`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] for out-of-range columns or
    /// unnormalized bounds.
    pub fn into_claim(self, access: Vec<AccessRecord>) -> Result<Claim, StoreError> {
        let bounds = Bounds {
            world: decode_world(self.world_id)?,
            min_x: self.min_x,
            min_y: self.min_y,
            min_z: self.min_z,
            max_x: self.max_x,
            max_y: self.max_y,
            max_z: self.max_z,
        };
        if !bounds.is_normalized() {
            return Err(StoreError::Corrupt(format!(
                "claim {} has inverted bounds",
                self.id
            )));
        }
        let type_id = u16::try_from(self.reinforcement_type).map_err(|e| {
            StoreError::Corrupt(format!("reinforcement_type {}: {e}", self.reinforcement_type))
        })?;
        let health = u32::try_from(self.health)
            .map_err(|e| StoreError::Corrupt(format!("health {}: {e}", self.health)))?;

        Ok(Claim {
            id: ClaimId::from(self.id),
            group_id: GroupId::from(self.group_id),
            bounds,
            created_at: self.created_at,
            refreshed_at: self.refreshed_at,
            reinforcement: Reinforcement {
                type_id,
                health,
                insecure: self.insecure,
            },
            access,
        })
    }
}

/// A row from the `ctdl_access_records` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccessRow {
    /// Claim the record belongs to.
    pub claim_id: Uuid,
    /// Position within the claim's record list.
    pub ordinal: i32,
    /// `group` or `player`.
    pub subject_kind: String,
    /// Group or player ID.
    pub subject_id: Uuid,
    /// Build flag.
    pub can_build: bool,
    /// Container flag.
    pub can_container: bool,
    /// Door flag.
    pub can_door: bool,
    /// Interact flag.
    pub can_interact: bool,
    /// Manage flag.
    pub can_manage: bool,
}

impl AccessRow {
    /// Decode into a domain [`AccessRecord`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] for an unknown subject kind.
    pub fn into_record(self) -> Result<AccessRecord, StoreError> {
        let subject = match self.subject_kind.as_str() {
            "group" => AccessSubject::Group(GroupId::from(self.subject_id)),
            "player" => AccessSubject::Player(PlayerId::from(self.subject_id)),
            other => {
                return Err(StoreError::Corrupt(format!("unknown subject kind {other:?}")));
            }
        };
        Ok(AccessRecord {
            subject,
            permissions: PermissionSet {
                build: self.can_build,
                container: self.can_container,
                door: self.can_door,
                interact: self.can_interact,
                manage: self.can_manage,
            },
        })
    }
}
