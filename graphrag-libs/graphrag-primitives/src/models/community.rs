use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One row of the flattened hierarchy: node `node` belongs to `community` at `level`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommunityAssignment {
    pub level: u32,
    pub community: u32,
    pub node: String,
    pub parent: Option<u32>,
}

/// A community in the hierarchy arena. `id` is its index in `CommunityHierarchy::communities`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityNode {
    pub id: u32,
    pub level: u32,
    pub parent: Option<u32>,
    pub children: Vec<u32>,
    /// Sorted member node ids.
    pub members: Vec<String>,
}

/// Multi-level community forest. Level 0 is the coarsest partition; each deeper
/// level splits communities that exceeded the maximum cluster size.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommunityHierarchy {
    pub communities: Vec<CommunityNode>,
}

impl CommunityHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a community and links it to its parent. Returns the new id.
    pub fn push(&mut self, level: u32, parent: Option<u32>, mut members: Vec<String>) -> u32 {
        members.sort();
        let id = self.communities.len() as u32;
        if let Some(parent_id) = parent {
            if let Some(parent_node) = self.communities.get_mut(parent_id as usize) {
                parent_node.children.push(id);
            }
        }
        self.communities.push(CommunityNode {
            id,
            level,
            parent,
            children: Vec::new(),
            members,
        });
        id
    }

    pub fn is_empty(&self) -> bool {
        self.communities.is_empty()
    }

    pub fn community(&self, id: u32) -> Option<&CommunityNode> {
        self.communities.get(id as usize)
    }

    pub fn levels(&self) -> Vec<u32> {
        let levels: BTreeSet<u32> = self.communities.iter().map(|c| c.level).collect();
        levels.into_iter().collect()
    }

    pub fn max_level(&self) -> Option<u32> {
        self.communities.iter().map(|c| c.level).max()
    }

    pub fn communities_at_level(&self, level: u32) -> impl Iterator<Item = &CommunityNode> {
        self.communities.iter().filter(move |c| c.level == level)
    }

    /// (level, community) pairs for a node, ordered from coarsest to finest.
    pub fn node_communities(&self, node: &str) -> Vec<(u32, u32)> {
        let mut result: Vec<(u32, u32)> = self
            .communities
            .iter()
            .filter(|c| c.members.binary_search_by(|m| m.as_str().cmp(node)).is_ok())
            .map(|c| (c.level, c.id))
            .collect();
        result.sort();
        result
    }

    /// Flattened (level, community, node, parent) records, sorted.
    pub fn assignments(&self) -> Vec<CommunityAssignment> {
        let mut assignments: Vec<CommunityAssignment> = self
            .communities
            .iter()
            .flat_map(|c| {
                c.members.iter().map(move |node| CommunityAssignment {
                    level: c.level,
                    community: c.id,
                    node: node.clone(),
                    parent: c.parent,
                })
            })
            .collect();
        assignments.sort();
        assignments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_push_links_parent_and_child() {
        let mut hierarchy = CommunityHierarchy::new();
        let root = hierarchy.push(0, None, members(&["C", "A", "B"]));
        let child = hierarchy.push(1, Some(root), members(&["B", "A"]));

        assert_eq!(hierarchy.community(root).unwrap().children, vec![child]);
        assert_eq!(hierarchy.community(root).unwrap().members, members(&["A", "B", "C"]));
        assert_eq!(hierarchy.community(child).unwrap().parent, Some(root));
        assert_eq!(hierarchy.levels(), vec![0, 1]);
        assert_eq!(hierarchy.node_communities("A"), vec![(0, root), (1, child)]);
        assert_eq!(hierarchy.node_communities("C"), vec![(0, root)]);
    }

    #[test]
    fn test_assignments_are_sorted_by_level() {
        let mut hierarchy = CommunityHierarchy::new();
        let root = hierarchy.push(0, None, members(&["A", "B"]));
        hierarchy.push(1, Some(root), members(&["A"]));
        hierarchy.push(1, Some(root), members(&["B"]));

        let assignments = hierarchy.assignments();
        assert_eq!(assignments.len(), 4);
        assert_eq!(assignments[0].level, 0);
        assert_eq!(assignments[2].parent, Some(root));
        assert_eq!(assignments[3].node, "B");
    }
}
