//! In-memory parent/child index over one thread's messages.
//!
//! Built once per operation from the thread's messages, so path, sibling and descendant queries
//! are linear in the thread size. Every walk is bounded by [`MAX_ANCESTRY_DEPTH`] and tracks
//! visited nodes, so corrupt parent links produce an error instead of a hang.
//!
//! ```rust
//! use ttree::{LeafPointer, MessageTree};
//!
//! let tree = MessageTree::new(Vec::new());
//! assert!(tree.path_to(&LeafPointer::Root).expect("root path").is_empty());
//! assert!(tree.latest().is_none());
//! ```

use std::collections::{HashMap, HashSet};

use tcommon::MessageId;

use crate::{BranchInfo, LeafPointer, StoreError, StoredMessage};

/// Upper bound on parent hops from any message to its root.
pub const MAX_ANCESTRY_DEPTH: usize = 10_000;

pub struct MessageTree {
    messages: Vec<StoredMessage>,
    by_id: HashMap<MessageId, usize>,
    children: HashMap<Option<MessageId>, Vec<usize>>,
}

impl MessageTree {
    pub fn new(mut messages: Vec<StoredMessage>) -> Self {
        messages.sort_by_key(|message| message.sequence);

        let mut by_id = HashMap::with_capacity(messages.len());
        let mut children: HashMap<Option<MessageId>, Vec<usize>> = HashMap::new();
        for (index, message) in messages.iter().enumerate() {
            by_id.insert(message.id.clone(), index);
            children
                .entry(message.parent_id.clone())
                .or_default()
                .push(index);
        }

        Self {
            messages,
            by_id,
            children,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: &MessageId) -> Option<&StoredMessage> {
        self.by_id.get(id).map(|index| &self.messages[*index])
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Most recently created message.
    pub fn latest(&self) -> Option<&StoredMessage> {
        self.messages.last()
    }

    /// Children in creation order.
    pub fn children(&self, id: &MessageId) -> Vec<&StoredMessage> {
        self.children_of(&Some(id.clone()))
    }

    pub fn roots(&self) -> Vec<&StoredMessage> {
        self.children_of(&None)
    }

    fn children_of(&self, parent: &Option<MessageId>) -> Vec<&StoredMessage> {
        self.children
            .get(parent)
            .map(|indices| indices.iter().map(|index| &self.messages[*index]).collect())
            .unwrap_or_default()
    }

    /// Resolves a leaf pointer to a concrete message id. `Root` and an empty `Latest` give `None`.
    pub fn resolve_leaf(&self, leaf: &LeafPointer) -> Result<Option<MessageId>, StoreError> {
        match leaf {
            LeafPointer::Root => Ok(None),
            LeafPointer::Latest => Ok(self.latest().map(|message| message.id.clone())),
            LeafPointer::Message(id) if self.contains(id) => Ok(Some(id.clone())),
            LeafPointer::Message(id) => Err(StoreError::not_found(format!(
                "message '{id}' is not part of this thread"
            ))),
        }
    }

    /// Root-to-leaf path ending at `leaf`.
    pub fn path_to(&self, leaf: &LeafPointer) -> Result<Vec<StoredMessage>, StoreError> {
        let Some(leaf_id) = self.resolve_leaf(leaf)? else {
            return Ok(Vec::new());
        };

        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = Some(leaf_id);
        while let Some(id) = cursor {
            if !seen.insert(id.clone()) {
                return Err(StoreError::corrupted(format!(
                    "cycle detected in ancestry at message '{id}'"
                )));
            }
            if path.len() >= MAX_ANCESTRY_DEPTH {
                return Err(StoreError::corrupted(format!(
                    "ancestry deeper than {MAX_ANCESTRY_DEPTH} messages"
                )));
            }

            // A parent outside this thread ends the walk.
            let Some(message) = self.get(&id) else {
                break;
            };
            path.push(message.clone());
            cursor = message.parent_id.clone();
        }

        path.reverse();
        Ok(path)
    }

    pub fn branch_info(&self, id: &MessageId) -> Result<BranchInfo, StoreError> {
        let message = self
            .get(id)
            .ok_or_else(|| StoreError::not_found(format!("message '{id}' not found")))?;

        let siblings = self
            .children_of(&message.parent_id)
            .into_iter()
            .map(|sibling| sibling.id.clone())
            .collect::<Vec<_>>();
        let position = siblings
            .iter()
            .position(|sibling| sibling == id)
            .unwrap_or_default();

        Ok(BranchInfo {
            current: position + 1,
            total: siblings.len(),
            siblings,
        })
    }

    /// `id` plus every transitive child, parents before children.
    pub fn subtree_ids(&self, id: &MessageId) -> Result<Vec<MessageId>, StoreError> {
        if !self.contains(id) {
            return Err(StoreError::not_found(format!("message '{id}' not found")));
        }

        let mut ordered = vec![id.clone()];
        let mut seen = HashSet::from([id.clone()]);
        let mut cursor = 0;
        while cursor < ordered.len() {
            let children = self
                .children(&ordered[cursor])
                .into_iter()
                .map(|child| child.id.clone())
                .collect::<Vec<_>>();
            for child in children {
                if seen.insert(child.clone()) {
                    ordered.push(child);
                }
            }
            cursor += 1;
        }

        Ok(ordered)
    }

    /// Follows the most recently created child until reaching a leaf.
    pub fn deepest_latest_descendant(&self, id: &MessageId) -> Result<MessageId, StoreError> {
        if !self.contains(id) {
            return Err(StoreError::not_found(format!("message '{id}' not found")));
        }

        let mut current = id.clone();
        let mut seen = HashSet::from([current.clone()]);
        for _ in 0..MAX_ANCESTRY_DEPTH {
            let Some(next) = self.children(&current).last().map(|child| child.id.clone()) else {
                return Ok(current);
            };
            if !seen.insert(next.clone()) {
                return Err(StoreError::corrupted(format!(
                    "cycle detected below message '{id}'"
                )));
            }
            current = next;
        }

        Err(StoreError::corrupted(format!(
            "descendants of '{id}' deeper than {MAX_ANCESTRY_DEPTH} messages"
        )))
    }

    pub fn into_messages(self) -> Vec<StoredMessage> {
        self.messages
    }
}
