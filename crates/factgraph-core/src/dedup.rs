//! Intra-document entity deduplication.
//!
//! Entities of the same type are clustered with union-find over their
//! normalized surface forms. Two forms join when their LCS ratio meets the
//! threshold, or when one appears inside the other on word boundaries and the
//! containing forms all belong to a single cluster. Each cluster collapses to
//! one canonical entity whose other forms become aliases.
//!
//! Running the deduplicator on its own output returns that output unchanged.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::DedupConfig;
use crate::entity::{count_mentions, Entity, EntityType, CONTESTED_TYPES_PROPERTY};
use crate::normalize::{contains_as_words, meets_threshold, normalize_for, similarity, strip_display_titles};

#[derive(Debug, Clone)]
pub(crate) struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    pub(crate) fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Joins the sets of `a` and `b`; false when they were already joined.
    pub(crate) fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        true
    }

    /// Member indices per set, sets ordered by their smallest member.
    pub(crate) fn groups(&mut self) -> Vec<Vec<usize>> {
        let mut by_root: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for idx in 0..self.parent.len() {
            let root = self.find(idx);
            by_root.entry(root).or_default().push(idx);
        }
        let mut groups: Vec<Vec<usize>> = by_root.into_values().collect();
        groups.sort_by_key(|members| members[0]);
        groups
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DedupOutcome {
    pub entities: Vec<Entity>,
    /// Input entities absorbed into another.
    pub merges: usize,
    /// Short forms left unmerged because they fit more than one cluster.
    pub ambiguous: Vec<String>,
}

pub struct Deduplicator {
    config: DedupConfig,
}

impl Deduplicator {
    #[must_use]
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn deduplicate(&self, entities: &[Entity]) -> DedupOutcome {
        let mut uf = UnionFind::new(entities.len());
        let mut ambiguous = BTreeSet::new();

        let mut by_type: BTreeMap<&EntityType, Vec<usize>> = BTreeMap::new();
        for (idx, entity) in entities.iter().enumerate() {
            by_type.entry(&entity.entity_type).or_default().push(idx);
        }

        for (entity_type, members) in by_type {
            self.cluster_type(entities, entity_type, &members, &mut uf, &mut ambiguous);
        }

        let groups = uf.groups();
        let mut merges = 0;
        let mut out = Vec::with_capacity(groups.len());
        for members in groups {
            if members.len() == 1 {
                out.push(entities[members[0]].clone());
                continue;
            }
            merges += members.len() - 1;
            let cluster: Vec<&Entity> = members.iter().map(|&i| &entities[i]).collect();
            let merged = merge_entities(
                &cluster,
                self.config.canonical_tolerance,
                self.config.max_context_windows,
            );
            tracing::debug!(
                rule = "dedup_merge",
                item = %merged.name,
                members = cluster.len(),
                "Merged entities"
            );
            out.push(merged);
        }

        DedupOutcome {
            entities: out,
            merges,
            ambiguous: ambiguous.into_iter().collect(),
        }
    }

    fn cluster_type(
        &self,
        entities: &[Entity],
        entity_type: &EntityType,
        members: &[usize],
        uf: &mut UnionFind,
        ambiguous: &mut BTreeSet<String>,
    ) {
        // Distinct normalized forms and the first entity carrying each.
        let mut owners: HashMap<String, usize> = HashMap::new();
        let mut forms: Vec<(String, usize)> = Vec::new();
        for &idx in members {
            for form in entities[idx].surface_forms() {
                let normalized = normalize_for(form, entity_type);
                if normalized.is_empty() {
                    continue;
                }
                match owners.get(&normalized) {
                    Some(&owner) => {
                        uf.union(owner, idx);
                    }
                    None => {
                        owners.insert(normalized.clone(), idx);
                        forms.push((normalized, idx));
                    }
                }
            }
        }

        for (i, (a, owner_a)) in forms.iter().enumerate() {
            for (b, owner_b) in &forms[i + 1..] {
                if meets_threshold(similarity(a, b), self.config.similarity_threshold) {
                    uf.union(*owner_a, *owner_b);
                }
            }
        }

        // Substring attachment, repeated until no new union happens.
        loop {
            let mut changed = false;
            ambiguous.retain(|form| !owners.contains_key(form));
            for (short, owner) in &forms {
                let own_root = uf.find(*owner);
                let roots: BTreeSet<usize> = forms
                    .iter()
                    .filter(|(long, _)| contains_as_words(long, short))
                    .map(|(_, long_owner)| uf.find(*long_owner))
                    .filter(|root| *root != own_root)
                    .collect();
                match roots.len() {
                    0 => {}
                    1 => {
                        if let Some(&root) = roots.first() {
                            changed |= uf.union(*owner, root);
                        }
                    }
                    _ => {
                        ambiguous.insert(short.clone());
                    }
                }
            }
            if !changed {
                break;
            }
        }

        for form in ambiguous.iter().filter(|form| owners.contains_key(*form)) {
            tracing::debug!(
                rule = "ambiguous_substring",
                item = %form,
                entity_type = %entity_type,
                "Leaving short form unmerged"
            );
        }
    }
}

/// Collapses a cluster into one entity. The canonical name is the longest
/// (title-stripped for people) name among members whose confidence is within
/// `tolerance` of the best; every other surface form becomes an alias.
pub(crate) fn merge_entities(members: &[&Entity], tolerance: f64, max_windows: usize) -> Entity {
    let mut ordered: Vec<(usize, &Entity)> = members.iter().copied().enumerate().collect();
    ordered.sort_by_key(|(idx, entity)| (entity.first_span_start().unwrap_or(usize::MAX), *idx));

    let best = ordered
        .iter()
        .map(|(_, e)| e.confidence)
        .fold(0.0_f64, f64::max);
    let entity_type = ordered[0].1.entity_type.clone();

    let display = |e: &Entity| {
        if e.entity_type.strips_titles() {
            strip_display_titles(&e.name)
        } else {
            e.name.clone()
        }
    };

    let mut canonical: Option<(String, f64)> = None;
    for (_, entity) in &ordered {
        if entity.confidence + tolerance + 1e-9 < best {
            continue;
        }
        let name = display(entity);
        let better = match &canonical {
            None => true,
            Some((current, confidence)) => {
                let (len, current_len) = (name.chars().count(), current.chars().count());
                len > current_len || (len == current_len && entity.confidence > *confidence)
            }
        };
        if better {
            canonical = Some((name, entity.confidence));
        }
    }
    let name = canonical.map_or_else(|| display(ordered[0].1), |(name, _)| name);

    let mut merged = Entity::new(name, entity_type).with_confidence(best);

    let mut spans = Vec::new();
    let mut unspanned_mentions = 0u32;
    for (_, entity) in &ordered {
        merged.sources.extend(entity.sources.iter().copied());
        for form in entity.surface_forms() {
            if form != merged.name {
                merged.aliases.insert(form.to_string());
            }
        }
        if entity.spans.is_empty() {
            unspanned_mentions += entity.mention_count;
        } else {
            spans.extend(entity.spans.iter().copied());
        }
        for window in &entity.context_windows {
            if merged.context_windows.len() < max_windows && !merged.context_windows.contains(window) {
                merged.context_windows.push(window.clone());
            }
        }
        for (key, value) in &entity.properties {
            if key == CONTESTED_TYPES_PROPERTY {
                let labels: BTreeSet<&str> = merged
                    .properties
                    .get(key)
                    .map(String::as_str)
                    .into_iter()
                    .chain(std::iter::once(value.as_str()))
                    .flat_map(|v| v.split(','))
                    .filter(|l| !l.is_empty())
                    .collect();
                let joined = labels.into_iter().collect::<Vec<_>>().join(",");
                merged.properties.insert(key.clone(), joined);
            } else {
                merged
                    .properties
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
        }
    }

    spans.sort_unstable();
    spans.dedup();
    let counted = u32::try_from(count_mentions(&spans)).unwrap_or(u32::MAX);
    merged.mention_count = counted.saturating_add(unspanned_mentions).max(1);
    merged.spans = spans;
    merged
}
