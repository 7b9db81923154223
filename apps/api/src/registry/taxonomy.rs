//! Skills taxonomy: an id-keyed node table with a parent tree and a separate
//! prerequisite edge set. Validated once when built; immutable afterwards.

use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::models::skills::SkillTaxonomyEntry;
use crate::registry::RegistryError;

#[derive(Debug, Clone, Default)]
pub struct SkillTaxonomy {
    entries: BTreeMap<String, SkillTaxonomyEntry>,
}

impl SkillTaxonomy {
    /// Builds and validates a taxonomy. Rejects duplicate ids, skills without
    /// levels, dangling parent/prerequisite references, parent loops and
    /// prerequisite cycles.
    pub fn from_entries(entries: Vec<SkillTaxonomyEntry>) -> Result<Self, RegistryError> {
        let mut map = BTreeMap::new();
        for entry in entries {
            if entry.proficiency_levels.is_empty() {
                return Err(RegistryError::EmptyLevels(entry.id));
            }
            if map.contains_key(&entry.id) {
                return Err(RegistryError::DuplicateSkill(entry.id));
            }
            map.insert(entry.id.clone(), entry);
        }

        for entry in map.values() {
            if let Some(parent) = &entry.parent_id {
                if !map.contains_key(parent) {
                    return Err(RegistryError::UnknownReference {
                        skill: entry.id.clone(),
                        relation: "parent",
                        target: parent.clone(),
                    });
                }
            }
            for prereq in &entry.prerequisite_ids {
                if !map.contains_key(prereq) {
                    return Err(RegistryError::UnknownReference {
                        skill: entry.id.clone(),
                        relation: "prerequisite",
                        target: prereq.clone(),
                    });
                }
            }
        }

        check_parent_tree(&map)?;
        check_prerequisites_acyclic(&map)?;

        Ok(Self { entries: map })
    }

    pub fn get(&self, skill_id: &str) -> Option<&SkillTaxonomyEntry> {
        self.entries.get(skill_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in id order.
    pub fn entries(&self) -> impl Iterator<Item = &SkillTaxonomyEntry> {
        self.entries.values()
    }

    /// Entries for the given ids, in id order, skipping unknown ids.
    pub fn subset<'a, I>(&self, skill_ids: I) -> Vec<&SkillTaxonomyEntry>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let wanted: HashSet<&str> = skill_ids.into_iter().collect();
        self.entries
            .values()
            .filter(|e| wanted.contains(e.id.as_str()))
            .collect()
    }

    /// Case-insensitive substring search over id, name, synonyms and description.
    pub fn search(&self, query: &str) -> Vec<&SkillTaxonomyEntry> {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return Vec::new();
        }
        self.entries
            .values()
            .filter(|e| {
                e.id.to_lowercase().contains(&q)
                    || e.name.to_lowercase().contains(&q)
                    || e.synonyms.iter().any(|s| s.to_lowercase().contains(&q))
                    || e.description
                        .as_deref()
                        .map(|d| d.to_lowercase().contains(&q))
                        .unwrap_or(false)
            })
            .collect()
    }
}

fn check_parent_tree(map: &BTreeMap<String, SkillTaxonomyEntry>) -> Result<(), RegistryError> {
    for start in map.values() {
        let mut seen = HashSet::new();
        let mut cursor = Some(start);
        while let Some(node) = cursor {
            if !seen.insert(node.id.as_str()) {
                return Err(RegistryError::ParentCycle(start.id.clone()));
            }
            cursor = node.parent_id.as_deref().and_then(|p| map.get(p));
        }
    }
    Ok(())
}

fn check_prerequisites_acyclic(
    map: &BTreeMap<String, SkillTaxonomyEntry>,
) -> Result<(), RegistryError> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();
    for id in map.keys() {
        index.insert(id.as_str(), graph.add_node(id.as_str()));
    }
    // Edge prerequisite -> dependent skill.
    for entry in map.values() {
        for prereq in &entry.prerequisite_ids {
            graph.add_edge(index[prereq.as_str()], index[entry.id.as_str()], ());
        }
    }
    toposort(&graph, None)
        .map(|_| ())
        .map_err(|cycle| RegistryError::TaxonomyCycle(graph[cycle.node_id()].to_string()))
}
