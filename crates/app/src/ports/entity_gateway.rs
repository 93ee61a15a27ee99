//! Entity gateway port — the field write-back contract of the external
//! entity store.

use std::future::Future;

use taskflow_domain::entity::{EntityModel, EntitySnapshot};
use taskflow_domain::error::TaskflowError;
use taskflow_domain::field::FieldValue;
use taskflow_domain::id::{EntityId, TenantId};

/// Result of a single-field write: the value it replaced and a snapshot
/// taken after the write.
#[derive(Debug, Clone)]
pub struct WriteReceipt {
    pub previous: FieldValue,
    pub snapshot: EntitySnapshot,
}

/// Writes single field values back into the external entity store.
pub trait EntityGateway {
    /// Write `value` into `field` of the given record and return the
    /// receipt used to synthesize the follow-up mutation event.
    fn write_field(
        &self,
        tenant_id: TenantId,
        model: EntityModel,
        entity_id: EntityId,
        field: &str,
        value: FieldValue,
    ) -> impl Future<Output = Result<WriteReceipt, TaskflowError>> + Send;
}
