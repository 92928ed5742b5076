//! UI tree building
//!
//! Renders an element and its descendants into serializable [`TreeNode`]s.
//! `origin` is always absolute; `frame` is relative to the parent's origin
//! except on the root node, where it is absolute.

use crate::errors::AxError;
use crate::format::format_value;
use crate::identity::{ElementId, IdentityEngine};
use crate::names::display_name;
use crate::store::{AttrValue, Attribute, CapabilityStore};
use ax_protocol::{Point, Rect};
use serde::Serialize;
use std::collections::HashSet;

/// One rendered element
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeNode {
    pub id: ElementId,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subrole: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Point>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<Rect>,
    /// Present only when false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Present only when true
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focused: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
}

const NODE_ATTRIBUTES: [Attribute; 9] = [
    Attribute::Role,
    Attribute::Subrole,
    Attribute::Title,
    Attribute::Description,
    Attribute::Value,
    Attribute::Position,
    Attribute::Size,
    Attribute::Enabled,
    Attribute::Focused,
];

fn as_text<H>(value: Option<AttrValue<H>>) -> Option<String> {
    match value {
        Some(AttrValue::Text(s)) if !s.is_empty() => Some(s),
        _ => None,
    }
}

/// Builder for converting live elements into [`TreeNode`]s
pub struct TreeBuilder<'a, S: CapabilityStore> {
    identity: IdentityEngine<'a, S>,
}

impl<'a, S: CapabilityStore> TreeBuilder<'a, S> {
    pub fn new(identity: IdentityEngine<'a, S>) -> Self {
        Self { identity }
    }

    /// Render `root` with descendants down to `max_depth` levels (`None` = unlimited)
    pub fn build(&self, root: &S::Handle, max_depth: Option<usize>) -> Result<TreeNode, AxError> {
        self.build_node(root, max_depth, 0, None)
    }

    /// Render a single element without children
    pub fn describe(&self, element: &S::Handle) -> Result<TreeNode, AxError> {
        self.build(element, Some(0))
    }

    fn build_node(
        &self,
        handle: &S::Handle,
        max_depth: Option<usize>,
        depth: usize,
        parent_origin: Option<Point>,
    ) -> Result<TreeNode, AxError> {
        let store = self.identity.store();
        // Registered before recursing so later commands in this run skip the search
        let id = self.identity.register(handle)?;

        let values: [Option<AttrValue<S::Handle>>; 9] = store
            .attributes(handle, &NODE_ATTRIBUTES)?
            .try_into()
            .map_err(|_| AxError::action_failed("attribute batch returned an unexpected shape"))?;
        let [role, subrole, title, description, value, position, size, enabled, focused] = values;

        let origin = match position {
            Some(AttrValue::Point(p)) => Some(p),
            _ => None,
        };
        let size = match size {
            Some(AttrValue::Size(s)) => Some(s),
            _ => None,
        };
        let frame = origin.zip(size).map(|(o, s)| match parent_origin {
            Some(parent) => Rect::new(o.x - parent.x, o.y - parent.y, s.width, s.height),
            None => Rect::from_origin_size(o, s),
        });

        let actions = store
            .actions(handle)
            .unwrap_or_default()
            .iter()
            .map(|a| display_name(a))
            .collect();

        let children = if max_depth.is_none_or(|max| depth < max) {
            Some(self.build_children(handle, max_depth, depth, origin))
        } else {
            None
        };

        Ok(TreeNode {
            id,
            role: as_text(role)
                .map(|r| display_name(&r))
                .unwrap_or_else(|| "unknown".to_string()),
            subrole: as_text(subrole).map(|r| display_name(&r)),
            title: as_text(title),
            description: as_text(description),
            value: value.map(|v| format_value(&v)),
            origin,
            frame,
            enabled: matches!(enabled, Some(AttrValue::Bool(false))).then_some(false),
            focused: matches!(focused, Some(AttrValue::Bool(true))).then_some(true),
            actions,
            children,
        })
    }

    /// Windows first, then children, each UI object once
    fn build_children(
        &self,
        handle: &S::Handle,
        max_depth: Option<usize>,
        depth: usize,
        origin: Option<Point>,
    ) -> Vec<TreeNode> {
        let store = self.identity.store();
        let mut seen = HashSet::new();
        let mut nodes = Vec::new();

        for relation in [Attribute::Windows, Attribute::Children] {
            for child in store.elements(handle, relation).unwrap_or_default() {
                if !seen.insert(store.content_hash(&child)) {
                    continue;
                }
                match self.build_node(&child, max_depth, depth + 1, origin) {
                    Ok(node) => nodes.push(node),
                    Err(e) => tracing::debug!("skipping child element: {}", e),
                }
            }
        }
        nodes
    }
}
