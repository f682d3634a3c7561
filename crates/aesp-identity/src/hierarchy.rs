//! The agent delegation tree: bounded depth, recursive removal, and
//! escalation chains that terminate at a synthetic "human" ancestor.

use std::collections::{BTreeMap, VecDeque};

use aesp_core::constants::{MAX_HIERARCHY_DEPTH, SYNTHETIC_HUMAN_LABEL};
use aesp_core::AespError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub agent_id: String,
    pub label: String,
    pub parent_agent_id: Option<String>,
    pub children: Vec<String>,
    pub depth: u32,
}

/// In-memory delegation tree, keyed by `agentId`. Persisted as the flat
/// node list returned by [`Hierarchy::to_flat_list`]; [`Hierarchy::from_flat_list`]
/// relinks children in a second pass so load order never matters.
#[derive(Debug, Default)]
pub struct Hierarchy {
    nodes: BTreeMap<String, HierarchyNode>,
}

impl Hierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, agent_id: &str) -> Option<&HierarchyNode> {
        self.nodes.get(agent_id)
    }

    /// Adds a root (`parent_agent_id = None`) or a child under an existing
    /// node. Fails if the agent already exists, the agent is its own
    /// parent, the named parent doesn't exist, or the parent sits at
    /// `MAX_HIERARCHY_DEPTH`.
    pub fn add(
        &mut self,
        agent_id: &str,
        label: &str,
        parent_agent_id: Option<&str>,
    ) -> Result<(), AespError> {
        if self.nodes.contains_key(agent_id) {
            return Err(AespError::Serialization(format!(
                "agent {agent_id} already present in hierarchy"
            )));
        }

        let depth = match parent_agent_id {
            None => 0,
            Some(parent_id) => {
                if parent_id == agent_id {
                    return Err(AespError::Serialization(
                        "an agent may not be its own parent".to_string(),
                    ));
                }
                let parent = self.nodes.get(parent_id).ok_or_else(|| {
                    AespError::Serialization(format!("parent agent {parent_id} not found"))
                })?;
                if parent.depth >= MAX_HIERARCHY_DEPTH {
                    return Err(AespError::Serialization(format!(
                        "parent {parent_id} is already at maximum hierarchy depth"
                    )));
                }
                parent.depth + 1
            }
        };

        self.nodes.insert(
            agent_id.to_string(),
            HierarchyNode {
                agent_id: agent_id.to_string(),
                label: label.to_string(),
                parent_agent_id: parent_agent_id.map(str::to_string),
                children: Vec::new(),
                depth,
            },
        );

        if let Some(parent_id) = parent_agent_id {
            if let Some(parent) = self.nodes.get_mut(parent_id) {
                parent.children.push(agent_id.to_string());
            }
        }

        Ok(())
    }

    /// Removes `agent_id` and every descendant, unlinking it from its
    /// parent's child list.
    pub fn remove(&mut self, agent_id: &str) -> Result<(), AespError> {
        let node = self
            .nodes
            .get(agent_id)
            .ok_or_else(|| AespError::Serialization(format!("agent {agent_id} not found")))?
            .clone();

        for child in node.children.clone() {
            self.remove(&child)?;
        }

        if let Some(parent_id) = &node.parent_agent_id {
            if let Some(parent) = self.nodes.get_mut(parent_id) {
                parent.children.retain(|c| c != agent_id);
            }
        }

        self.nodes.remove(agent_id);
        Ok(())
    }

    pub fn is_ancestor(&self, candidate_ancestor: &str, agent_id: &str) -> bool {
        let mut current = self.nodes.get(agent_id);
        while let Some(node) = current {
            match &node.parent_agent_id {
                Some(parent_id) if parent_id == candidate_ancestor => return true,
                Some(parent_id) => current = self.nodes.get(parent_id),
                None => return false,
            }
        }
        false
    }

    /// All descendants of `agent_id`, breadth-first, not including itself.
    pub fn descendants(&self, agent_id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut queue: VecDeque<String> = self
            .nodes
            .get(agent_id)
            .map(|n| n.children.clone())
            .unwrap_or_default()
            .into();
        while let Some(id) = queue.pop_front() {
            if let Some(node) = self.nodes.get(&id) {
                queue.extend(node.children.clone());
            }
            out.push(id);
        }
        out
    }

    /// The chain from `agent_id` up through every parent, terminated by the
    /// synthetic "human" label.
    pub fn escalation_chain(&self, agent_id: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = self.nodes.get(agent_id);
        while let Some(node) = current {
            chain.push(node.label.clone());
            current = node.parent_agent_id.as_deref().and_then(|p| self.nodes.get(p));
        }
        chain.push(SYNTHETIC_HUMAN_LABEL.to_string());
        chain
    }

    pub fn to_flat_list(&self) -> Vec<HierarchyNode> {
        self.nodes.values().cloned().collect()
    }

    /// Rebuilds the tree from a flat node list, ignoring any persisted
    /// `children` (they are derived, not stored truth) and relinking in a
    /// second pass so parent/child ordering in the input never matters.
    pub fn from_flat_list(flat: Vec<HierarchyNode>) -> Self {
        let mut nodes: BTreeMap<String, HierarchyNode> = flat
            .into_iter()
            .map(|mut n| {
                n.children.clear();
                (n.agent_id.clone(), n)
            })
            .collect();

        let links: Vec<(String, String)> = nodes
            .values()
            .filter_map(|n| n.parent_agent_id.clone().map(|p| (p, n.agent_id.clone())))
            .collect();

        for (parent_id, child_id) in links {
            if let Some(parent) = nodes.get_mut(&parent_id) {
                parent.children.push(child_id);
            }
        }

        Self { nodes }
    }
}
