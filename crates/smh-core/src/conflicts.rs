//! Groups of spectral models that claim the same transitions.

use crate::linelist::{TransitionHash, TransitionStore};
use crate::model::SpectralModel;
use serde::Serialize;
use std::collections::HashMap;

/// Model indices of one connected component, ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictGroup {
    members: Vec<usize>,
}

impl ConflictGroup {
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.members.binary_search(&index).is_ok()
    }
}

struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, mut node: usize) -> usize {
        while self.parent[node] != node {
            self.parent[node] = self.parent[self.parent[node]];
            node = self.parent[node];
        }
        node
    }

    fn union(&mut self, left: usize, right: usize) {
        let left = self.find(left);
        let right = self.find(right);
        if left == right {
            return;
        }
        match self.rank[left].cmp(&self.rank[right]) {
            std::cmp::Ordering::Less => self.parent[left] = right,
            std::cmp::Ordering::Greater => self.parent[right] = left,
            std::cmp::Ordering::Equal => {
                self.parent[right] = left;
                self.rank[left] = self.rank[left].saturating_add(1);
            }
        }
    }
}

/// Connected components (size >= 2) of the "shares a transition" relation.
/// Hashes missing from `store` link nothing. Groups are ordered by their
/// smallest member.
pub fn compute(models: &[SpectralModel], store: &TransitionStore) -> Vec<ConflictGroup> {
    let mut sets = DisjointSet::new(models.len());
    let mut first_owner: HashMap<TransitionHash, usize> = HashMap::new();
    for (index, model) in models.iter().enumerate() {
        for hash in model.transition_hashes() {
            if !store.contains(*hash) {
                continue;
            }
            match first_owner.get(hash) {
                Some(&owner) => sets.union(owner, index),
                None => {
                    first_owner.insert(*hash, index);
                }
            }
        }
    }

    let mut by_root: HashMap<usize, Vec<usize>> = HashMap::new();
    for index in 0..models.len() {
        let root = sets.find(index);
        by_root.entry(root).or_default().push(index);
    }

    let mut groups: Vec<ConflictGroup> = by_root
        .into_values()
        .filter(|members| members.len() >= 2)
        .map(|members| ConflictGroup { members })
        .collect();
    groups.sort_by_key(|group| group.members[0]);
    groups
}
