//! Object lookup collaborator used for label matching
//!
//! Label rules need the live labels of the object an event refers to.
//! The lookup is external (it talks to the cluster), so it is modelled as
//! an async trait object returning a boxed future.

use std::collections::{BTreeMap, HashMap};

use futures::future::{self, BoxFuture};
use thiserror::Error;

/// Labels attached to a cluster object
pub type Labels = BTreeMap<String, String>;

/// Resource kinds whose labels can be looked up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Pod,
    Deployment,
    PersistentVolumeClaim,
}

impl ObjectKind {
    /// Map an involved object's kind; `None` for unsupported kinds
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "Pod" => Some(ObjectKind::Pod),
            "Deployment" => Some(ObjectKind::Deployment),
            "PersistentVolumeClaim" => Some(ObjectKind::PersistentVolumeClaim),
            _ => None,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKind::Pod => write!(f, "Pod"),
            ObjectKind::Deployment => write!(f, "Deployment"),
            ObjectKind::PersistentVolumeClaim => write!(f, "PersistentVolumeClaim"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: ObjectKind,
        namespace: String,
        name: String,
    },

    #[error("object lookup unavailable: {0}")]
    Unavailable(String),
}

/// Fetches the live labels of a cluster object
pub trait ObjectLookup: Send + Sync {
    fn labels<'a>(
        &'a self,
        kind: ObjectKind,
        namespace: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Labels, LookupError>>;
}

/// In-memory object inventory
#[derive(Debug, Default, Clone)]
pub struct StaticObjectLookup {
    objects: HashMap<(ObjectKind, String, String), Labels>,
}

impl StaticObjectLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object and its labels
    pub fn insert<I, K, V>(&mut self, kind: ObjectKind, namespace: &str, name: &str, labels: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let labels = labels
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.objects
            .insert((kind, namespace.to_string(), name.to_string()), labels);
    }
}

impl ObjectLookup for StaticObjectLookup {
    fn labels<'a>(
        &'a self,
        kind: ObjectKind,
        namespace: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Labels, LookupError>> {
        let result = self
            .objects
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| LookupError::NotFound {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        Box::pin(future::ready(result))
    }
}

/// Lookup used when no cluster access is configured; every lookup fails
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableObjectLookup;

impl ObjectLookup for UnavailableObjectLookup {
    fn labels<'a>(
        &'a self,
        _kind: ObjectKind,
        _namespace: &'a str,
        _name: &'a str,
    ) -> BoxFuture<'a, Result<Labels, LookupError>> {
        Box::pin(future::ready(Err(LookupError::Unavailable(
            "no cluster connection configured".to_string(),
        ))))
    }
}
