//! Backend-assigned resource handles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ATTR_PUBLIC_IP: &str = "public_ip";
pub const ATTR_PRIVATE_IP: &str = "private_ip";
pub const ATTR_DNS_NAME: &str = "dns_name";
pub const ATTR_ARN: &str = "arn";

/// What the backend reports after creating one plan node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handle {
    /// Declaration id of the plan node
    pub id: String,

    /// Provider-assigned identifier (instance id, subnet id, ...)
    pub provider_id: String,

    /// Addresses, DNS names, ARNs
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    pub created_at: DateTime<Utc>,
}

impl Handle {
    pub fn new(id: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider_id: provider_id.into(),
            attributes: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Attribute lookup; `id` is the provider id
    pub fn attribute(&self, key: &str) -> Option<&str> {
        if key == "id" {
            return Some(&self.provider_id);
        }
        self.attributes.get(key).map(|s| s.as_str())
    }
}

/// Handles keyed by declaration id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleSet {
    handles: BTreeMap<String, Handle>,
}

impl HandleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: Handle) -> Option<Handle> {
        self.handles.insert(handle.id.clone(), handle)
    }

    pub fn get(&self, id: &str) -> Option<&Handle> {
        self.handles.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.handles.contains_key(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Handle> {
        self.handles.remove(id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Keep the handles whose id passes `keep`; returns the dropped ids
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) -> Vec<String> {
        let mut dropped = Vec::new();
        self.handles.retain(|id, _| {
            let kept = keep(id);
            if !kept {
                dropped.push(id.clone());
            }
            kept
        });
        dropped
    }

    /// Subset containing only the given ids
    pub fn subset<'a>(&self, ids: impl IntoIterator<Item = &'a String>) -> HandleSet {
        let mut out = HandleSet::new();
        for id in ids {
            if let Some(handle) = self.handles.get(id) {
                out.insert(handle.clone());
            }
        }
        out
    }
}

impl FromIterator<Handle> for HandleSet {
    fn from_iter<T: IntoIterator<Item = Handle>>(iter: T) -> Self {
        let mut set = HandleSet::new();
        for handle in iter {
            set.insert(handle);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_lookup() {
        let handle = Handle::new("bastion", "i-0abc")
            .with_attribute(ATTR_PUBLIC_IP, "203.0.113.10")
            .with_attribute(ATTR_PRIVATE_IP, "10.0.0.10");

        assert_eq!(handle.attribute("id"), Some("i-0abc"));
        assert_eq!(handle.attribute(ATTR_PUBLIC_IP), Some("203.0.113.10"));
        assert_eq!(handle.attribute(ATTR_DNS_NAME), None);
    }

    #[test]
    fn test_subset() {
        let set: HandleSet = vec![
            Handle::new("a", "1"),
            Handle::new("b", "2"),
            Handle::new("c", "3"),
        ]
        .into_iter()
        .collect();

        let ids = vec!["a".to_string(), "c".to_string(), "missing".to_string()];
        let sub = set.subset(&ids);
        assert_eq!(sub.len(), 2);
        assert!(sub.contains("a"));
        assert!(!sub.contains("b"));
    }

    #[test]
    fn test_retain() {
        let mut set: HandleSet = vec![Handle::new("a", "1"), Handle::new("b", "2")]
            .into_iter()
            .collect();

        assert_eq!(set.retain(|id| id == "a"), vec!["b"]);
        assert!(set.contains("a"));
        assert_eq!(set.len(), 1);
    }
}
