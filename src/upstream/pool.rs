//! Upstream target registry.
//!
//! One [`UpstreamTarget`] per distinct route target authority, created at
//! startup from the route table. Routes sharing a target share its slots.

use std::collections::HashMap;
use std::sync::Arc;

use crate::routing::RouteTable;
use crate::upstream::target::UpstreamTarget;

#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: HashMap<String, Arc<UpstreamTarget>>,
}

impl TargetRegistry {
    pub fn from_routes(routes: &RouteTable, max_in_flight_per_target: usize) -> Self {
        let mut targets = HashMap::new();
        for rule in routes.rules() {
            targets
                .entry(rule.target_authority.clone())
                .or_insert_with(|| Arc::new(UpstreamTarget::new(rule.target_authority.clone(), max_in_flight_per_target)));
        }
        tracing::debug!(targets = targets.len(), max_in_flight_per_target, "Upstream targets registered");
        Self { targets }
    }

    pub fn get(&self, authority: &str) -> Option<&Arc<UpstreamTarget>> {
        self.targets.get(authority)
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<UpstreamTarget>> {
        self.targets.values()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
