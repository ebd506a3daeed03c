//! Category taxonomy loaded from the category cache.
//!
//! The tree is stored as an arena: every node lives in one `Vec` and refers to
//! its children by index. `parent_id` is kept as a lookup field only.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use crate::store::{CategorySource, StoreError};

/// Category identifier, unique within one tree.
pub type CategoryId = i64;

/// Errors raised while loading a category tree.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("no category tree found for key '{0}'")]
    NotFound(String),

    #[error("category tree is corrupt: {0}")]
    CorruptData(String),

    #[error("category source unavailable: {0}")]
    Unavailable(#[from] StoreError),
}

/// A single category of the taxonomy.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryNode {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub parent_id: Option<CategoryId>,
    children: Vec<usize>,
}

impl CategoryNode {
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }
}

/// Wire shape of a node inside the cached JSON array.
#[derive(Debug, Deserialize)]
struct CategoryNodeSpec {
    id: CategoryId,
    name: String,
    slug: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    parent_id: Option<CategoryId>,
    #[serde(default)]
    children: Option<Vec<CategoryNodeSpec>>,
}

/// Immutable category forest.
#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    nodes: Vec<CategoryNode>,
    roots: Vec<usize>,
    index: HashMap<CategoryId, usize>,
}

impl CategoryTree {
    /// Fetch and parse the tree stored under `key`.
    pub async fn load(source: &dyn CategorySource, key: &str) -> Result<Self, TreeError> {
        let raw = source.get(key).await?;
        match raw {
            Some(raw) if !raw.trim().is_empty() => Self::from_json(&raw),
            _ => Err(TreeError::NotFound(key.to_string())),
        }
    }

    /// Parse a JSON array of nested category nodes.
    pub fn from_json(raw: &str) -> Result<Self, TreeError> {
        let specs: Vec<CategoryNodeSpec> =
            serde_json::from_str(raw).map_err(|e| TreeError::CorruptData(e.to_string()))?;

        let mut tree = Self::default();
        for spec in specs {
            let root = tree.insert(spec)?;
            tree.roots.push(root);
        }
        Ok(tree)
    }

    fn insert(&mut self, spec: CategoryNodeSpec) -> Result<usize, TreeError> {
        if self.index.contains_key(&spec.id) {
            return Err(TreeError::CorruptData(format!(
                "duplicate category id {}",
                spec.id
            )));
        }

        let slot = self.nodes.len();
        self.index.insert(spec.id, slot);
        self.nodes.push(CategoryNode {
            id: spec.id,
            name: spec.name,
            slug: spec.slug,
            description: spec.description,
            parent_id: spec.parent_id,
            children: Vec::new(),
        });

        let mut children = Vec::new();
        for child in spec.children.unwrap_or_default() {
            children.push(self.insert(child)?);
        }
        self.nodes[slot].children = children;
        Ok(slot)
    }

    /// Top-level categories in source order.
    pub fn roots(&self) -> Vec<&CategoryNode> {
        self.roots.iter().map(|&i| &self.nodes[i]).collect()
    }

    /// Direct children of `node` in source order.
    pub fn children(&self, node: &CategoryNode) -> Vec<&CategoryNode> {
        node.children.iter().map(|&i| &self.nodes[i]).collect()
    }

    pub fn get(&self, id: CategoryId) -> Option<&CategoryNode> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    /// Parent of `node`, resolved through `parent_id`.
    pub fn parent(&self, node: &CategoryNode) -> Option<&CategoryNode> {
        node.parent_id.and_then(|id| self.get(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of levels in the deepest branch.
    pub fn height(&self) -> usize {
        fn depth(tree: &CategoryTree, slot: usize) -> usize {
            1 + tree.nodes[slot]
                .children
                .iter()
                .map(|&c| depth(tree, c))
                .max()
                .unwrap_or(0)
        }
        self.roots.iter().map(|&r| depth(self, r)).max().unwrap_or(0)
    }
}
