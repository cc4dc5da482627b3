//! Filter Engine - event selection
//!
//! Decides which events enter the buffer and, through [`StashTrigger`],
//! which accepted events should cause an automatic stash.
//!
//! A rule set is a disjunction: an event is accepted when any rule matches.
//! Within a rule every specified field must match.

mod lookup;
mod trigger;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, Span};

use crate::types::Event;

pub use lookup::{
    LookupError, Labels, ObjectKind, ObjectLookup, StaticObjectLookup, UnavailableObjectLookup,
};
pub use trigger::StashTrigger;

/// Selects events by involved object apiVersion, kind and/or labels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRule {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    /// Involved object kind, e.g. `Pod`
    #[serde(default, alias = "resource", skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl FilterRule {
    pub fn api_version(api_version: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            ..Default::default()
        }
    }

    pub fn kind(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    /// apiVersion and kind checks, which need no lookup
    fn matches_reference(&self, event: &Event) -> bool {
        let object = &event.involved_object;
        (self.api_version.is_empty() || self.api_version == object.api_version)
            && (self.kind.is_empty() || self.kind == object.kind)
    }
}

/// Evaluates a rule set against events
#[derive(Clone)]
pub struct FilterEngine {
    rules: Vec<FilterRule>,
    lookup: Arc<dyn ObjectLookup>,
    span: Span,
}

impl FilterEngine {
    pub fn new(rules: Vec<FilterRule>, lookup: Arc<dyn ObjectLookup>, span: Span) -> Self {
        Self {
            rules,
            lookup,
            span,
        }
    }

    /// Engine with no rules, accepting every event
    pub fn accept_all() -> Self {
        Self::new(Vec::new(), Arc::new(UnavailableObjectLookup), Span::none())
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// True if the rule list is empty or any rule matches
    pub async fn accept(&self, event: &Event) -> bool {
        if self.rules.is_empty() {
            return true;
        }

        for rule in &self.rules {
            if self.rule_matches(rule, event).await {
                return true;
            }
        }

        false
    }

    async fn rule_matches(&self, rule: &FilterRule, event: &Event) -> bool {
        if !rule.matches_reference(event) {
            return false;
        }

        if rule.labels.is_empty() {
            return true;
        }

        self.labels_match(&rule.labels, event).await
    }

    /// Live label check; unsupported kinds and lookup failures never match
    async fn labels_match(&self, wanted: &BTreeMap<String, String>, event: &Event) -> bool {
        let object = &event.involved_object;
        let Some(kind) = ObjectKind::from_kind(&object.kind) else {
            debug!(parent: &self.span, kind = %object.kind, "label rule skipped for unsupported kind");
            return false;
        };

        let namespace = event.involved_namespace();
        match self.lookup.labels(kind, namespace, &object.name).await {
            Ok(labels) => wanted
                .iter()
                .all(|(key, value)| labels.get(key) == Some(value)),
            Err(e) => {
                debug!(
                    parent: &self.span,
                    %kind,
                    namespace,
                    name = %object.name,
                    error = %e,
                    "label lookup failed, treating rule as non-matching"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for FilterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterEngine")
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventType;

    fn pod_event(uid: &str, api_version: &str, name: &str) -> Event {
        Event::new(uid, EventType::Normal, "msg").with_involved_object(api_version, "Pod", "prod", name)
    }

    fn engine_with(rules: Vec<FilterRule>) -> FilterEngine {
        let mut lookup = StaticObjectLookup::new();
        lookup.insert(ObjectKind::Pod, "prod", "web-0", [("app", "web"), ("tier", "front")]);
        lookup.insert(ObjectKind::Pod, "prod", "db-0", [("app", "db")]);
        lookup.insert(ObjectKind::Deployment, "prod", "api", [("app", "api")]);
        FilterEngine::new(rules, Arc::new(lookup), Span::none())
    }

    #[tokio::test]
    async fn test_empty_rules_accept_everything() {
        let engine = FilterEngine::accept_all();
        assert!(engine.accept(&pod_event("1", "v1", "anything")).await);
        assert!(engine.accept(&Event::new("2", EventType::Warning, "bare")).await);
    }

    #[tokio::test]
    async fn test_api_version_rule_rejects_other_versions() {
        let engine = engine_with(vec![FilterRule::api_version("x/v1")]);
        assert!(engine.accept(&pod_event("1", "x/v1", "web-0")).await);
        assert!(!engine.accept(&pod_event("2", "v1", "web-0")).await);
        assert!(!engine.accept(&pod_event("3", "x/v2", "web-0")).await);
    }

    #[tokio::test]
    async fn test_fields_are_conjoined_within_rule() {
        let rule = FilterRule {
            api_version: "apps/v1".to_string(),
            kind: "Deployment".to_string(),
            labels: BTreeMap::new(),
        };
        let engine = engine_with(vec![rule]);

        let deployment = Event::new("1", EventType::Normal, "scaled")
            .with_involved_object("apps/v1", "Deployment", "prod", "api");
        let replica_set = Event::new("2", EventType::Normal, "scaled")
            .with_involved_object("apps/v1", "ReplicaSet", "prod", "api-x");

        assert!(engine.accept(&deployment).await);
        assert!(!engine.accept(&replica_set).await);
    }

    #[tokio::test]
    async fn test_rules_are_disjunctive() {
        let engine = engine_with(vec![FilterRule::kind("Node"), FilterRule::kind("Pod")]);
        assert!(engine.accept(&pod_event("1", "v1", "web-0")).await);

        let svc = Event::new("2", EventType::Normal, "m").with_involved_object("v1", "Service", "prod", "s");
        assert!(!engine.accept(&svc).await);
    }

    #[tokio::test]
    async fn test_label_match_requires_all_pairs() {
        let rule = FilterRule::kind("Pod").with_label("app", "web").with_label("tier", "front");
        let engine = engine_with(vec![rule]);
        assert!(engine.accept(&pod_event("1", "v1", "web-0")).await);
        assert!(!engine.accept(&pod_event("2", "v1", "db-0")).await);

        let rule = FilterRule::default().with_label("app", "web").with_label("tier", "back");
        let engine = engine_with(vec![rule]);
        assert!(!engine.accept(&pod_event("3", "v1", "web-0")).await);
    }

    #[tokio::test]
    async fn test_failed_label_rule_does_not_hide_later_rules() {
        let engine = engine_with(vec![
            FilterRule::default().with_label("app", "nope"),
            FilterRule::api_version("v1"),
        ]);
        assert!(engine.accept(&pod_event("1", "v1", "web-0")).await);
    }

    #[tokio::test]
    async fn test_unsupported_kind_never_label_matches() {
        let engine = engine_with(vec![FilterRule::default().with_label("app", "web")]);
        let node = Event::new("1", EventType::Normal, "m").with_involved_object("v1", "Node", "", "web-0");
        assert!(!engine.accept(&node).await);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_non_match() {
        let engine = engine_with(vec![FilterRule::default().with_label("app", "web")]);
        assert!(!engine.accept(&pod_event("1", "v1", "missing")).await);

        let unavailable = FilterEngine::new(
            vec![FilterRule::default().with_label("app", "web")],
            Arc::new(UnavailableObjectLookup),
            Span::none(),
        );
        assert!(!unavailable.accept(&pod_event("2", "v1", "web-0")).await);
    }

    #[test]
    fn test_rule_accepts_resource_alias() {
        let rule: FilterRule = serde_yaml::from_str("apiVersion: v1\nresource: Pod\nlabels:\n  app: web\n").unwrap();
        let expected = FilterRule {
            api_version: "v1".to_string(),
            ..FilterRule::kind("Pod").with_label("app", "web")
        };
        assert_eq!(rule, expected);
    }
}
