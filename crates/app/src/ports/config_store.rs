//! Config store port — immutable rule/link/registry snapshots.
//!
//! Rules and links are authored externally; the engine only ever reads
//! versioned snapshots. A snapshot is fetched once per event, so one
//! evaluation never observes a half-applied configuration change.

use std::future::Future;
use std::sync::Arc;

use taskflow_domain::entity::EntityModel;
use taskflow_domain::error::TaskflowError;
use taskflow_domain::field::FieldRegistry;
use taskflow_domain::id::LinkId;
use taskflow_domain::link::FieldLink;
use taskflow_domain::rule::AutomationRule;

/// An immutable snapshot of automation rules.
///
/// Rules are kept sorted by id so that evaluation order — and therefore
/// multi-rule firings — is deterministic and reproducible.
#[derive(Debug, Clone)]
pub struct RuleSet {
    version: u32,
    rules: Vec<AutomationRule>,
}

impl RuleSet {
    /// Build a snapshot, fixing the evaluation order (ascending rule id).
    #[must_use]
    pub fn new(version: u32, mut rules: Vec<AutomationRule>) -> Self {
        rules.sort_by_key(|rule| rule.id);
        Self { version, rules }
    }

    /// The configuration version this snapshot was loaded from.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// All rules, in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = &AutomationRule> {
        self.rules.iter()
    }

    /// Enabled rules only, in evaluation order.
    pub fn enabled(&self) -> impl Iterator<Item = &AutomationRule> {
        self.rules.iter().filter(|rule| rule.enabled)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// An immutable snapshot of field links.
#[derive(Debug, Clone)]
pub struct LinkSet {
    version: u32,
    links: Vec<FieldLink>,
}

impl LinkSet {
    /// Build a snapshot with a deterministic order (ascending link id).
    #[must_use]
    pub fn new(version: u32, mut links: Vec<FieldLink>) -> Self {
        links.sort_by_key(|link| link.id);
        Self { version, links }
    }

    /// The configuration version this snapshot was loaded from.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// All links, in order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldLink> {
        self.links.iter()
    }

    /// Links declared for a model, in order.
    pub fn for_model(&self, model: EntityModel) -> impl Iterator<Item = &FieldLink> {
        self.links.iter().filter(move |link| link.model == model)
    }

    /// Resolve a link by id.
    #[must_use]
    pub fn by_id(&self, id: LinkId) -> Option<&FieldLink> {
        self.links.iter().find(|link| link.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Read access to the current configuration snapshots.
pub trait ConfigStore {
    /// The field registry snapshot.
    fn registry(&self) -> impl Future<Output = Result<Arc<FieldRegistry>, TaskflowError>> + Send;

    /// The automation-rule snapshot.
    fn rules(&self) -> impl Future<Output = Result<Arc<RuleSet>, TaskflowError>> + Send;

    /// The field-link snapshot.
    fn links(&self) -> impl Future<Output = Result<Arc<LinkSet>, TaskflowError>> + Send;
}
