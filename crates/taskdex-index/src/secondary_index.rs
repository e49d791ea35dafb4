//! Value → task-id set maps backing the filtered lookups.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use taskdex_core::TaskId;

/// Set of task ids.
pub type IdSet = HashSet<TaskId>;

/// Direction of an index update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IndexOp {
    Insert,
    Remove,
}

/// Map from a field value to the ids of the tasks carrying that value.
///
/// Buckets are never empty: removing the last id of a bucket drops the bucket.
#[derive(Debug, Clone)]
pub struct SecondaryIndex<K> {
    buckets: HashMap<K, IdSet>,
}

impl<K: Eq + Hash> PartialEq for SecondaryIndex<K> {
    fn eq(&self, other: &Self) -> bool {
        self.buckets == other.buckets
    }
}

impl<K: Eq + Hash> Eq for SecondaryIndex<K> {}

impl<K> Default for SecondaryIndex<K> {
    fn default() -> Self {
        Self {
            buckets: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> SecondaryIndex<K> {
    /// Ids stored under `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&IdSet> {
        self.buckets.get(key)
    }

    /// Whether `id` is stored under `key`.
    #[must_use]
    pub fn contains(&self, key: &K, id: &TaskId) -> bool {
        self.buckets.get(key).is_some_and(|ids| ids.contains(id))
    }

    /// Iterate over `(value, ids)` buckets in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &IdSet)> {
        self.buckets.iter()
    }

    /// Number of distinct values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no value is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Ids of every task that has any value for this field.
    #[must_use]
    pub fn union_all(&self) -> IdSet {
        self.buckets.values().flatten().cloned().collect()
    }

    /// Union of the buckets whose value satisfies `pred`.
    pub fn union_where(&self, mut pred: impl FnMut(&K) -> bool) -> IdSet {
        self.buckets
            .iter()
            .filter(|(key, _)| pred(key))
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }

    /// Whether every indexed id satisfies `known`.
    pub(crate) fn all_ids(&self, mut known: impl FnMut(&TaskId) -> bool) -> bool {
        self.buckets.values().flatten().all(|id| known(id))
    }

    pub(crate) fn apply(&mut self, op: IndexOp, key: K, id: &TaskId) {
        match op {
            IndexOp::Insert => {
                self.buckets.entry(key).or_default().insert(id.clone());
            }
            IndexOp::Remove => {
                if let Entry::Occupied(mut bucket) = self.buckets.entry(key) {
                    bucket.get_mut().remove(id);
                    if bucket.get().is_empty() {
                        bucket.remove();
                    }
                }
            }
        }
    }
}

#[derive(Serialize)]
struct BucketRef<'a, K> {
    key: &'a K,
    ids: Vec<&'a TaskId>,
}

#[derive(Deserialize)]
struct Bucket<K> {
    key: K,
    ids: Vec<TaskId>,
}

impl<K> Serialize for SecondaryIndex<K>
where
    K: Serialize + Ord,
{
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut buckets: Vec<BucketRef<'_, K>> = self
            .buckets
            .iter()
            .map(|(key, ids)| {
                let mut ids: Vec<&TaskId> = ids.iter().collect();
                ids.sort();
                BucketRef { key, ids }
            })
            .collect();
        buckets.sort_by(|a, b| a.key.cmp(b.key));
        s.collect_seq(buckets)
    }
}

impl<'de, K> Deserialize<'de> for SecondaryIndex<K>
where
    K: Deserialize<'de> + Eq + Hash,
{
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Vec::<Bucket<K>>::deserialize(d)?;
        let mut index = Self::default();
        for bucket in raw {
            if bucket.ids.is_empty() {
                continue;
            }
            index
                .buckets
                .entry(bucket.key)
                .or_default()
                .extend(bucket.ids);
        }
        Ok(index)
    }
}
