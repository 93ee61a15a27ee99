//! `SQLite` implementation of [`EntityGateway`].
//!
//! Entities are stored as a JSON field map per `(tenant, model, id)`.
//! This adapter stands in for the external entity store's write-back
//! contract; the daemon also uses it to seed and read snapshots.

use std::collections::HashMap;

use sqlx::{Row, SqlitePool};

use taskflow_app::ports::{EntityGateway, WriteReceipt};
use taskflow_domain::entity::{EntityModel, EntitySnapshot};
use taskflow_domain::error::TaskflowError;
use taskflow_domain::field::FieldValue;
use taskflow_domain::id::{EntityId, TenantId};

use crate::error::StorageError;

/// `SQLite`-backed entity gateway.
#[derive(Clone)]
pub struct SqliteEntityGateway {
    pool: SqlitePool,
}

impl SqliteEntityGateway {
    /// Create a new gateway backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store (or replace) an entity's full field map.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when serialization or the write fails.
    pub async fn put_snapshot(
        &self,
        tenant_id: TenantId,
        snapshot: &EntitySnapshot,
    ) -> Result<(), StorageError> {
        let fields = serde_json::to_string(&snapshot.fields)?;
        sqlx::query(
            "INSERT INTO entities (tenant_id, model, id, fields, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (tenant_id, model, id) DO UPDATE SET \
             fields = excluded.fields, updated_at = excluded.updated_at",
        )
        .bind(tenant_id.to_string())
        .bind(snapshot.model.to_string())
        .bind(snapshot.entity_id.to_string())
        .bind(fields)
        .bind(taskflow_domain::time::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Read an entity's current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the read or JSON decoding fails.
    pub async fn get_snapshot(
        &self,
        tenant_id: TenantId,
        model: EntityModel,
        entity_id: EntityId,
    ) -> Result<Option<EntitySnapshot>, StorageError> {
        let row = sqlx::query("SELECT fields FROM entities WHERE tenant_id = ? AND model = ? AND id = ?")
            .bind(tenant_id.to_string())
            .bind(model.to_string())
            .bind(entity_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let fields: String = row.try_get("fields")?;
        let fields: HashMap<String, FieldValue> = serde_json::from_str(&fields)?;
        Ok(Some(EntitySnapshot {
            model,
            entity_id,
            fields,
        }))
    }
}

impl EntityGateway for SqliteEntityGateway {
    async fn write_field(
        &self,
        tenant_id: TenantId,
        model: EntityModel,
        entity_id: EntityId,
        field: &str,
        value: FieldValue,
    ) -> Result<WriteReceipt, TaskflowError> {
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        let row = sqlx::query(
            "SELECT fields FROM entities WHERE tenant_id = ? AND model = ? AND id = ?",
        )
        .bind(tenant_id.to_string())
        .bind(model.to_string())
        .bind(entity_id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(StorageError::from)?;

        let mut fields: HashMap<String, FieldValue> = match &row {
            Some(row) => {
                let text: String = row.try_get("fields").map_err(StorageError::from)?;
                serde_json::from_str(&text).map_err(StorageError::from)?
            }
            None => HashMap::new(),
        };
        let previous = fields
            .insert(field.to_string(), value)
            .unwrap_or(FieldValue::Null);

        let serialized = serde_json::to_string(&fields).map_err(StorageError::from)?;
        sqlx::query(
            "INSERT INTO entities (tenant_id, model, id, fields, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (tenant_id, model, id) DO UPDATE SET \
             fields = excluded.fields, updated_at = excluded.updated_at",
        )
        .bind(tenant_id.to_string())
        .bind(model.to_string())
        .bind(entity_id.to_string())
        .bind(serialized)
        .bind(taskflow_domain::time::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(StorageError::from)?;

        tx.commit().await.map_err(StorageError::from)?;

        Ok(WriteReceipt {
            previous,
            snapshot: EntitySnapshot {
                model,
                entity_id,
                fields,
            },
        })
    }
}
