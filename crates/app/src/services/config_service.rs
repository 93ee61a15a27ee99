//! Config service — authoring-time validation of rules and links.
//!
//! Definitions arrive from an external settings store. Everything is
//! validated against the field registry here, synchronously, so an
//! invalid definition is rejected before it can ever reach evaluation.

use std::future::Future;
use std::sync::Arc;

use taskflow_domain::error::TaskflowError;
use taskflow_domain::field::FieldRegistry;
use taskflow_domain::link::FieldLink;
use taskflow_domain::rule::AutomationRule;

use crate::ports::{ConfigStore, LinkSet, RuleSet};

/// Validates definitions and produces immutable snapshots.
pub struct ConfigService;

impl ConfigService {
    /// Validate every rule and link against the registry and build the
    /// engine's configuration.
    ///
    /// Disabled rules are kept in the snapshot — disabling a rule stops
    /// future task creation but existing tasks are left alone.
    ///
    /// # Errors
    ///
    /// Returns the first [`TaskflowError::Validation`] encountered; the
    /// whole batch is rejected, matching the all-or-nothing semantics of
    /// a configuration version.
    #[tracing::instrument(skip_all, fields(rules = rules.len(), links = links.len(), version))]
    pub fn load(
        registry: FieldRegistry,
        rules: Vec<AutomationRule>,
        links: Vec<FieldLink>,
        version: u32,
    ) -> Result<StaticConfig, TaskflowError> {
        for rule in &rules {
            rule.validate(&registry)?;
        }
        for link in &links {
            link.validate(&registry)?;
        }
        Ok(StaticConfig {
            registry: Arc::new(registry),
            rules: Arc::new(RuleSet::new(version, rules)),
            links: Arc::new(LinkSet::new(version, links)),
        })
    }
}

/// In-process [`ConfigStore`] over validated, immutable snapshots.
#[derive(Debug, Clone)]
pub struct StaticConfig {
    registry: Arc<FieldRegistry>,
    rules: Arc<RuleSet>,
    links: Arc<LinkSet>,
}

impl ConfigStore for StaticConfig {
    fn registry(&self) -> impl Future<Output = Result<Arc<FieldRegistry>, TaskflowError>> + Send {
        let registry = Arc::clone(&self.registry);
        async { Ok(registry) }
    }

    fn rules(&self) -> impl Future<Output = Result<Arc<RuleSet>, TaskflowError>> + Send {
        let rules = Arc::clone(&self.rules);
        async { Ok(rules) }
    }

    fn links(&self) -> impl Future<Output = Result<Arc<LinkSet>, TaskflowError>> + Send {
        let links = Arc::clone(&self.links);
        async { Ok(links) }
    }
}
