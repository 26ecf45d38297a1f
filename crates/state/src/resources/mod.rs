//! Resource quantity maps and the arithmetic used to maintain aggregates
//!
//! Amounts are stored as integer milli-units (the Kubernetes `MilliValue`):
//! `cpu: "1"` is 1000 and `memory: "1Ki"` is 1_024_000. Keys missing from a
//! map read as zero, so arithmetic and equality never need both sides to
//! carry the same keys.

mod quantity;

pub use quantity::{parse_quantity, QuantityError};

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

pub const CPU: &str = "cpu";
pub const MEMORY: &str = "memory";
pub const PODS: &str = "pods";
pub const EPHEMERAL_STORAGE: &str = "ephemeral-storage";

/// Sparse mapping from resource name to amount in milli-units
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceList(BTreeMap<String, i64>);

impl ResourceList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a Kubernetes quantity map, skipping values that do not parse
    pub fn from_quantities(quantities: &BTreeMap<String, Quantity>) -> Self {
        let mut list = Self::new();
        for (name, quantity) in quantities {
            match parse_quantity(&quantity.0) {
                Ok(milli) => {
                    list.0.insert(name.clone(), milli);
                }
                Err(e) => {
                    warn!(resource = %name, quantity = %quantity.0, error = %e, "Skipping unparseable quantity");
                }
            }
        }
        list
    }

    /// Amount for a resource, zero when absent
    pub fn get(&self, name: &str) -> i64 {
        self.0.get(name).copied().unwrap_or(0)
    }

    pub fn set(&mut self, name: impl Into<String>, milli: i64) {
        self.0.insert(name.into(), milli);
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, milli: i64) -> Self {
        self.set(name, milli);
        self
    }

    /// CPU in millicores
    pub fn cpu(&self) -> i64 {
        self.get(CPU)
    }

    /// Memory in milli-bytes
    pub fn memory(&self) -> i64 {
        self.get(MEMORY)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every amount is zero
    pub fn is_zero(&self) -> bool {
        self.0.values().all(|v| *v == 0)
    }
}

impl PartialEq for ResourceList {
    fn eq(&self, other: &Self) -> bool {
        self.0.keys().chain(other.0.keys()).all(|k| self.get(k) == other.get(k))
    }
}

impl Eq for ResourceList {}

impl FromIterator<(String, i64)> for ResourceList {
    fn from_iter<I: IntoIterator<Item = (String, i64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Sum any number of lists; keys are the union, missing values count as zero.
/// Sums saturate at the `i64` bounds.
pub fn merge<'a, I>(lists: I) -> ResourceList
where
    I: IntoIterator<Item = &'a ResourceList>,
{
    let mut result = ResourceList::new();
    for list in lists {
        for (name, milli) in &list.0 {
            let entry = result.0.entry(name.clone()).or_insert(0);
            *entry = entry.saturating_add(*milli);
        }
    }
    result
}

/// `a - b` over the keys of `a`. Results may go negative and are not clamped
/// to zero; they saturate at the `i64` bounds.
pub fn subtract(a: &ResourceList, b: &ResourceList) -> ResourceList {
    a.0.iter()
        .map(|(name, milli)| (name.clone(), milli.saturating_sub(b.get(name))))
        .collect()
}

/// Per-key maximum over the union of keys
pub fn max(a: &ResourceList, b: &ResourceList) -> ResourceList {
    let mut result = a.clone();
    for (name, milli) in &b.0 {
        let entry = result.0.entry(name.clone()).or_insert(*milli);
        if *milli > *entry {
            *entry = *milli;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(pairs: &[(&str, i64)]) -> ResourceList {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn fixtures() -> Vec<ResourceList> {
        vec![
            ResourceList::new(),
            list(&[(CPU, 1000)]),
            list(&[(CPU, 250), (MEMORY, 1_024_000)]),
            list(&[(MEMORY, -512_000), ("nvidia.com/gpu", 1000)]),
            list(&[(CPU, 0), (PODS, 110_000)]),
        ]
    }

    #[test]
    fn test_merge_no_args_is_empty() {
        let empty: [&ResourceList; 0] = [];
        assert!(merge(empty).is_empty());
    }

    #[test]
    fn test_merge_commutative_and_associative() {
        let lists = fixtures();
        for a in &lists {
            for b in &lists {
                assert_eq!(merge([a, b]), merge([b, a]));
                for c in &lists {
                    let left = merge([&merge([a, b]), c]);
                    let right = merge([a, &merge([b, c])]);
                    assert_eq!(left, right);
                }
            }
        }
    }

    #[test]
    fn test_subtract_inverts_merge() {
        let lists = fixtures();
        for a in &lists {
            for b in &lists {
                assert_eq!(subtract(&merge([a, b]), b), *a);
            }
        }
    }

    #[test]
    fn test_subtract_does_not_clamp() {
        let a = list(&[(CPU, 1000)]);
        let b = list(&[(CPU, 3000), (MEMORY, 10)]);
        let result = subtract(&a, &b);
        assert_eq!(result.cpu(), -2000);
        // keys only in b are not introduced
        assert!(!result.contains(MEMORY));
    }

    #[test]
    fn test_equality_treats_missing_as_zero() {
        assert_eq!(list(&[(CPU, 0)]), ResourceList::new());
        assert_ne!(list(&[(CPU, 1)]), ResourceList::new());
    }

    #[test]
    fn test_max_per_key() {
        let a = list(&[(CPU, 500), (MEMORY, 100)]);
        let b = list(&[(CPU, 200), (PODS, 1000)]);
        let m = max(&a, &b);
        assert_eq!(m.cpu(), 500);
        assert_eq!(m.memory(), 100);
        assert_eq!(m.get(PODS), 1000);
    }

    #[test]
    fn test_merge_saturates_large_storage() {
        let node = ResourceList::from_quantities(
            &[(EPHEMERAL_STORAGE.to_string(), Quantity("10Ti".to_string()))].into(),
        );
        let nodes = vec![node; 1000];
        let total = merge(&nodes);
        assert_eq!(total.get(EPHEMERAL_STORAGE), i64::MAX);

        let drained = subtract(&list(&[(MEMORY, i64::MIN + 1)]), &list(&[(MEMORY, 10)]));
        assert_eq!(drained.memory(), i64::MIN);
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let resources = list(&[(CPU, 1500), (MEMORY, 2_048_000)]);
        let json = serde_json::to_value(&resources).unwrap();
        assert_eq!(json, serde_json::json!({"cpu": 1500, "memory": 2048000}));

        let parsed: ResourceList = serde_json::from_str(r#"{"cpu": 1500}"#).unwrap();
        assert_eq!(parsed, list(&[(CPU, 1500), (MEMORY, 0)]));
    }

    #[test]
    fn test_from_quantities() {
        let mut quantities = BTreeMap::new();
        quantities.insert(CPU.to_string(), Quantity("500m".to_string()));
        quantities.insert(MEMORY.to_string(), Quantity("1Gi".to_string()));
        quantities.insert("bogus".to_string(), Quantity("lots".to_string()));

        let list = ResourceList::from_quantities(&quantities);
        assert_eq!(list.cpu(), 500);
        assert_eq!(list.memory(), 1024 * 1024 * 1024 * 1000);
        assert!(!list.contains("bogus"));
    }
}
