use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;

use crate::aggregations::agg_trait::AggregationBuilder;
use crate::aggregations::builder::Aggregation;
use crate::aggregations::types::AggregationResults;

/// Configured sub-aggregations of a bucket aggregation, by name.
pub type SubAggregations = BTreeMap<String, Aggregation>;

pub(crate) fn clone_sub_aggregations(subs: &SubAggregations) -> SubAggregations {
    subs.iter()
        .map(|(name, agg)| (name.clone(), agg.clone_empty()))
        .collect()
}

/// Fields read by `subs` and, transitively, by their own sub-aggregations.
fn sub_aggregation_fields(subs: &SubAggregations) -> BTreeSet<String> {
    let mut fields = BTreeSet::new();
    for agg in subs.values() {
        fields.insert(agg.field().to_string());
        fields.extend(agg.sub_aggregation_fields());
    }
    fields
}

pub(crate) fn sub_results(subs: &SubAggregations) -> AggregationResults {
    subs.iter()
        .map(|(name, agg)| (name.clone(), agg.result()))
        .collect()
}

#[derive(Debug)]
pub(crate) struct Slot<K> {
    pub key: K,
    pub count: i64,
    pub subs: Option<SubAggregations>,
}

impl<K> Slot<K> {
    pub fn sub_results(&self) -> AggregationResults {
        self.subs.as_ref().map(sub_results).unwrap_or_default()
    }
}

/// Bucket bookkeeping shared by every bucket aggregation.
///
/// Buckets are created on first sight and each lazily owns an empty clone of
/// the configured sub-aggregations. A document enters a bucket at most once.
/// Visits to sub-aggregation fields are buffered for the duration of the
/// document and replayed into every bucket the document entered when the
/// document ends, so the order in which fields are visited does not matter.
#[derive(Debug)]
pub(crate) struct BucketArena<K> {
    template: SubAggregations,
    sub_fields: BTreeSet<String>,
    slots: Vec<Slot<K>>,
    index: HashMap<K, usize>,
    active: Vec<usize>,
    pending: Vec<(String, Vec<u8>)>,
}

impl<K: Hash + Eq + Clone> BucketArena<K> {
    pub fn new(template: SubAggregations) -> Self {
        let sub_fields = sub_aggregation_fields(&template);
        Self {
            template,
            sub_fields,
            slots: Vec::new(),
            index: HashMap::new(),
            active: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn template(&self) -> &SubAggregations {
        &self.template
    }

    pub fn sub_fields(&self) -> &BTreeSet<String> {
        &self.sub_fields
    }

    pub fn clone_empty(&self) -> Self {
        Self::new(clone_sub_aggregations(&self.template))
    }

    pub fn start_doc(&mut self) {
        self.active.clear();
        self.pending.clear();
    }

    /// Put the current document into bucket `key`. Returns `false` when the
    /// document is already in it.
    pub fn enter(&mut self, key: K) -> bool {
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                let idx = self.slots.len();
                let subs = (!self.template.is_empty()).then(|| clone_sub_aggregations(&self.template));
                self.slots.push(Slot {
                    key: key.clone(),
                    count: 0,
                    subs,
                });
                self.index.insert(key, idx);
                idx
            }
        };

        if self.active.contains(&idx) {
            return false;
        }
        self.active.push(idx);
        self.slots[idx].count += 1;
        true
    }

    /// Buffer a visit for the sub-aggregations of this document's buckets.
    pub fn record(&mut self, field: &str, term: &[u8]) {
        if self.sub_fields.contains(field) {
            self.pending.push((field.to_string(), term.to_vec()));
        }
    }

    pub fn end_doc(&mut self) {
        if !self.template.is_empty() {
            for &idx in &self.active {
                if let Some(subs) = self.slots[idx].subs.as_mut() {
                    for agg in subs.values_mut() {
                        agg.start_doc();
                        for (field, term) in &self.pending {
                            agg.update_visitor(field, term);
                        }
                        agg.end_doc();
                    }
                }
            }
        }
        self.active.clear();
        self.pending.clear();
    }

    pub fn slots(&self) -> &[Slot<K>] {
        &self.slots
    }

    pub fn get(&self, key: &K) -> Option<&Slot<K>> {
        self.index.get(key).map(|&idx| &self.slots[idx])
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn size_in_bytes(&self, key_size: impl Fn(&K) -> usize) -> usize {
        let template: usize = self
            .template
            .iter()
            .map(|(name, agg)| name.capacity() + agg.size_in_bytes())
            .sum();
        let slots: usize = self
            .slots
            .iter()
            .map(|slot| {
                std::mem::size_of::<Slot<K>>()
                    + key_size(&slot.key)
                    + slot.subs.as_ref().map_or(0, |subs| {
                        subs.iter()
                            .map(|(name, agg)| name.capacity() + agg.size_in_bytes())
                            .sum()
                    })
            })
            .sum();
        let index = self.index.capacity() * (std::mem::size_of::<K>() + std::mem::size_of::<usize>());
        std::mem::size_of::<Self>() + template + slots + index
    }
}
