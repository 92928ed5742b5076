//! Snapshot-backed capability store
//!
//! Loads a recorded UI (applications → windows → nested controls) from JSON
//! into an arena and serves it through [`CapabilityStore`]. Every query mints
//! a fresh handle value, so two lookups of the same node never compare equal
//! while still sharing one content hash, which is how live platform handles
//! behave too. Writes and performed actions are applied to the arena.

use crate::store::{AppInfo, AttrValue, Attribute, CapabilityStore, StoreError, StoreResult};
use anyhow::Context;
use ax_protocol::{Point, Rect};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// kAXErrorAttributeUnsupported
const ERR_ATTRIBUTE_UNSUPPORTED: i32 = -25205;
/// kAXErrorActionUnsupported
const ERR_ACTION_UNSUPPORTED: i32 = -25206;

fn default_true() -> bool {
    true
}

fn default_role() -> String {
    "AXUnknown".to_string()
}

/// Serialized snapshot of a desktop
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub applications: Vec<AppSnapshot>,
    /// Full-screen PNG used to answer capture requests
    #[serde(default)]
    pub screen_image: Option<PathBuf>,
}

/// One running application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSnapshot {
    pub pid: i32,
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default = "default_true")]
    pub regular: bool,
    #[serde(default)]
    pub hash: Option<u64>,
    #[serde(default)]
    pub windows: Vec<NodeSnapshot>,
    /// Non-window children such as the menu bar
    #[serde(default)]
    pub children: Vec<NodeSnapshot>,
}

impl AppSnapshot {
    pub fn new(pid: i32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
            active: false,
            regular: true,
            hash: None,
            windows: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn active(mut self) -> Self {
        self.active = true;
        self
    }

    pub fn background(mut self) -> Self {
        self.regular = false;
        self
    }

    pub fn with_window(mut self, window: NodeSnapshot) -> Self {
        self.windows.push(window);
        self
    }

    pub fn with_child(mut self, child: NodeSnapshot) -> Self {
        self.children.push(child);
        self
    }
}

/// One UI element below an application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub subrole: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub help: Option<String>,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    /// Absolute screen frame
    #[serde(default)]
    pub frame: Option<Rect>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub focused: bool,
    #[serde(default = "default_true")]
    pub focusable: bool,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub hash: Option<u64>,
    #[serde(default)]
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            subrole: None,
            title: None,
            description: None,
            help: None,
            identifier: None,
            value: None,
            frame: None,
            enabled: true,
            focused: false,
            focusable: true,
            actions: Vec::new(),
            hash: None,
            children: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_subrole(mut self, subrole: impl Into<String>) -> Self {
        self.subrole = Some(subrole.into());
        self
    }

    pub fn with_frame(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.frame = Some(Rect::new(x, y, width, height));
        self
    }

    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_actions(mut self, actions: &[&str]) -> Self {
        self.actions = actions.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_hash(mut self, hash: u64) -> Self {
        self.hash = Some(hash);
        self
    }

    pub fn with_child(mut self, child: NodeSnapshot) -> Self {
        self.children.push(child);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn focused(mut self) -> Self {
        self.focused = true;
        self
    }

    pub fn unfocusable(mut self) -> Self {
        self.focusable = false;
        self
    }
}

/// Opaque handle into a [`SnapshotStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHandle {
    target: Target,
    serial: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    SystemWide,
    Node(usize),
    /// Root requested for a pid that is not running
    Missing(i32),
}

#[derive(Debug, Clone)]
struct Node {
    pid: i32,
    is_app: bool,
    parent: Option<usize>,
    children: Vec<usize>,
    windows: Vec<usize>,
    hash: u64,
    role: String,
    subrole: Option<String>,
    title: Option<String>,
    description: Option<String>,
    help: Option<String>,
    identifier: Option<String>,
    value: Option<serde_json::Value>,
    frame: Option<Rect>,
    enabled: bool,
    focused: bool,
    focusable: bool,
    actions: Vec<String>,
}

#[derive(Debug, Clone)]
struct AppRecord {
    info: AppInfo,
    node: usize,
}

/// Capability store serving a loaded [`Snapshot`]
pub struct SnapshotStore {
    nodes: Mutex<Vec<Node>>,
    apps: Vec<AppRecord>,
    screen_image: Option<PathBuf>,
    serial: AtomicU64,
    performed: Mutex<Vec<(u64, String)>>,
}

impl SnapshotStore {
    /// Load a snapshot from a JSON file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read snapshot {}", path.display()))?;
        let mut snapshot: Snapshot = serde_json::from_slice(&data)
            .with_context(|| format!("failed to parse snapshot {}", path.display()))?;

        // Image paths are relative to the snapshot file
        if let (Some(image), Some(dir)) = (&snapshot.screen_image, path.parent()) {
            if image.is_relative() {
                snapshot.screen_image = Some(dir.join(image));
            }
        }

        tracing::debug!(
            applications = snapshot.applications.len(),
            "loaded snapshot from {}",
            path.display()
        );
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut nodes = Vec::new();
        let mut apps = Vec::new();

        for app in snapshot.applications {
            let app_index = nodes.len();
            nodes.push(Node {
                pid: app.pid,
                is_app: true,
                parent: None,
                children: Vec::new(),
                windows: Vec::new(),
                hash: app.hash.unwrap_or_else(|| derive_hash(app.pid, &[])),
                role: "AXApplication".to_string(),
                subrole: None,
                title: Some(app.name.clone()),
                description: None,
                help: None,
                identifier: None,
                value: None,
                frame: None,
                enabled: true,
                focused: false,
                focusable: false,
                actions: Vec::new(),
            });

            let mut windows = Vec::new();
            for (idx, window) in app.windows.into_iter().enumerate() {
                let path = [0, idx];
                windows.push(insert_node(&mut nodes, window, app.pid, app_index, &path));
            }
            let mut children = Vec::new();
            for (idx, child) in app.children.into_iter().enumerate() {
                let path = [1, idx];
                children.push(insert_node(&mut nodes, child, app.pid, app_index, &path));
            }
            nodes[app_index].windows = windows;
            nodes[app_index].children = children;

            apps.push(AppRecord {
                info: AppInfo {
                    pid: app.pid,
                    name: app.name,
                    regular: app.regular,
                    active: app.active,
                },
                node: app_index,
            });
        }

        Self {
            nodes: Mutex::new(nodes),
            apps,
            screen_image: snapshot.screen_image,
            serial: AtomicU64::new(1),
            performed: Mutex::new(Vec::new()),
        }
    }

    /// Full-screen image backing capture requests, if the snapshot has one
    pub fn screen_image(&self) -> Option<&Path> {
        self.screen_image.as_deref()
    }

    /// Actions performed so far as (content hash, action name)
    pub fn performed_actions(&self) -> Vec<(u64, String)> {
        self.performed.lock().clone()
    }

    fn mint(&self, target: Target) -> SnapshotHandle {
        SnapshotHandle {
            target,
            serial: self.serial.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn node_index(&self, handle: &SnapshotHandle) -> StoreResult<Option<usize>> {
        match handle.target {
            Target::Node(index) => Ok(Some(index)),
            Target::SystemWide => Ok(None),
            Target::Missing(_) => Err(StoreError::InvalidElement),
        }
    }

    /// Window roots to hit-test, frontmost application first
    fn hit_test_roots(&self, nodes: &[Node], target: Target) -> StoreResult<Vec<usize>> {
        match target {
            Target::Missing(_) => Err(StoreError::InvalidElement),
            Target::SystemWide => {
                let mut ordered: Vec<&AppRecord> = self.apps.iter().collect();
                ordered.sort_by_key(|app| !app.info.active);
                Ok(ordered
                    .into_iter()
                    .flat_map(|app| nodes[app.node].windows.clone())
                    .collect())
            }
            Target::Node(index) if nodes[index].is_app => Ok(nodes[index].windows.clone()),
            Target::Node(index) => Ok(vec![index]),
        }
    }
}

fn derive_hash(pid: i32, path: &[usize]) -> u64 {
    let mut hasher = DefaultHasher::new();
    pid.hash(&mut hasher);
    path.hash(&mut hasher);
    hasher.finish()
}

fn insert_node(
    nodes: &mut Vec<Node>,
    snapshot: NodeSnapshot,
    pid: i32,
    parent: usize,
    path: &[usize],
) -> usize {
    let index = nodes.len();
    nodes.push(Node {
        pid,
        is_app: false,
        parent: Some(parent),
        children: Vec::new(),
        windows: Vec::new(),
        hash: snapshot.hash.unwrap_or_else(|| derive_hash(pid, path)),
        role: snapshot.role,
        subrole: snapshot.subrole,
        title: snapshot.title,
        description: snapshot.description,
        help: snapshot.help,
        identifier: snapshot.identifier,
        value: snapshot.value,
        frame: snapshot.frame,
        enabled: snapshot.enabled,
        focused: snapshot.focused,
        focusable: snapshot.focusable,
        actions: snapshot.actions,
    });

    let mut children = Vec::with_capacity(snapshot.children.len());
    for (idx, child) in snapshot.children.into_iter().enumerate() {
        let mut child_path = path.to_vec();
        child_path.push(idx);
        children.push(insert_node(nodes, child, pid, index, &child_path));
    }
    nodes[index].children = children;
    index
}

fn deepest_at(nodes: &[Node], index: usize, point: Point) -> Option<usize> {
    let node = &nodes[index];
    let inside = node.frame.map(|f| f.contains(point));
    if inside == Some(false) {
        return None;
    }
    // Later siblings are drawn on top
    for child in node.children.iter().rev() {
        if let Some(hit) = deepest_at(nodes, *child, point) {
            return Some(hit);
        }
    }
    inside.map(|_| index)
}

fn json_to_attr<H>(value: &serde_json::Value) -> AttrValue<H> {
    match value {
        serde_json::Value::String(s) => AttrValue::Text(s.clone()),
        serde_json::Value::Bool(b) => AttrValue::Bool(*b),
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(f) => AttrValue::Number(f),
            None => AttrValue::Other(n.to_string()),
        },
        other => AttrValue::Other(other.to_string()),
    }
}

impl CapabilityStore for SnapshotStore {
    type Handle = SnapshotHandle;

    fn attribute(
        &self,
        element: &SnapshotHandle,
        attribute: Attribute,
    ) -> StoreResult<Option<AttrValue<SnapshotHandle>>> {
        let Some(index) = self.node_index(element)? else {
            return Ok(match attribute {
                Attribute::Role => Some(AttrValue::Text("AXSystemWide".to_string())),
                _ => None,
            });
        };

        let nodes = self.nodes.lock();
        let node = &nodes[index];
        let text = |s: &Option<String>| s.clone().map(AttrValue::Text);

        Ok(match attribute {
            Attribute::Role => Some(AttrValue::Text(node.role.clone())),
            Attribute::Subrole => text(&node.subrole),
            Attribute::RoleDescription => None,
            Attribute::Title => text(&node.title),
            Attribute::Description => text(&node.description),
            Attribute::Help => text(&node.help),
            Attribute::Identifier => text(&node.identifier),
            Attribute::Value => node.value.as_ref().map(json_to_attr),
            Attribute::Position => node.frame.map(|f| AttrValue::Point(f.origin())),
            Attribute::Size => node.frame.map(|f| AttrValue::Size(f.size())),
            Attribute::Enabled => Some(AttrValue::Bool(node.enabled)),
            Attribute::Focused => Some(AttrValue::Bool(node.focused)),
            Attribute::Children => Some(AttrValue::Elements(
                node.children
                    .iter()
                    .map(|c| self.mint(Target::Node(*c)))
                    .collect(),
            )),
            Attribute::Windows if node.is_app => Some(AttrValue::Elements(
                node.windows
                    .iter()
                    .map(|w| self.mint(Target::Node(*w)))
                    .collect(),
            )),
            Attribute::Windows => None,
            Attribute::Parent => node
                .parent
                .map(|p| AttrValue::Element(self.mint(Target::Node(p)))),
        })
    }

    fn actions(&self, element: &SnapshotHandle) -> StoreResult<Vec<String>> {
        let Some(index) = self.node_index(element)? else {
            return Ok(Vec::new());
        };
        Ok(self.nodes.lock()[index].actions.clone())
    }

    fn perform_action(&self, element: &SnapshotHandle, action: &str) -> StoreResult<()> {
        let Some(index) = self.node_index(element)? else {
            return Err(StoreError::Platform {
                code: ERR_ACTION_UNSUPPORTED,
                context: action.to_string(),
            });
        };
        let nodes = self.nodes.lock();
        let node = &nodes[index];
        if !node.actions.iter().any(|a| a == action) {
            return Err(StoreError::Platform {
                code: ERR_ACTION_UNSUPPORTED,
                context: action.to_string(),
            });
        }
        self.performed.lock().push((node.hash, action.to_string()));
        Ok(())
    }

    fn set_attribute(
        &self,
        element: &SnapshotHandle,
        attribute: Attribute,
        value: AttrValue<SnapshotHandle>,
    ) -> StoreResult<()> {
        let unsupported = || StoreError::Platform {
            code: ERR_ATTRIBUTE_UNSUPPORTED,
            context: attribute.platform_name().to_string(),
        };
        let Some(index) = self.node_index(element)? else {
            return Err(unsupported());
        };

        let mut nodes = self.nodes.lock();
        match (attribute, value) {
            (Attribute::Value, AttrValue::Text(s)) => {
                nodes[index].value = Some(serde_json::Value::String(s));
            }
            (Attribute::Value, AttrValue::Number(n)) => {
                let number = serde_json::Number::from_f64(n).ok_or_else(unsupported)?;
                nodes[index].value = Some(serde_json::Value::Number(number));
            }
            (Attribute::Value, AttrValue::Bool(b)) => {
                nodes[index].value = Some(serde_json::Value::Bool(b));
            }
            (Attribute::Focused, AttrValue::Bool(focused)) => {
                if !nodes[index].focusable {
                    return Err(unsupported());
                }
                if focused {
                    let pid = nodes[index].pid;
                    for node in nodes.iter_mut().filter(|n| n.pid == pid) {
                        node.focused = false;
                    }
                }
                nodes[index].focused = focused;
            }
            (Attribute::Position, AttrValue::Point(p)) => {
                let frame = nodes[index].frame.ok_or_else(unsupported)?;
                nodes[index].frame = Some(Rect::from_origin_size(p, frame.size()));
            }
            (Attribute::Size, AttrValue::Size(s)) => {
                let frame = nodes[index].frame.ok_or_else(unsupported)?;
                nodes[index].frame = Some(Rect::from_origin_size(frame.origin(), s));
            }
            _ => return Err(unsupported()),
        }
        Ok(())
    }

    fn pid(&self, element: &SnapshotHandle) -> StoreResult<Option<i32>> {
        Ok(match self.node_index(element)? {
            Some(index) => Some(self.nodes.lock()[index].pid),
            None => None,
        })
    }

    fn content_hash(&self, element: &SnapshotHandle) -> u64 {
        match element.target {
            Target::Node(index) => self.nodes.lock()[index].hash,
            Target::SystemWide | Target::Missing(_) => 0,
        }
    }

    fn application(&self, pid: i32) -> SnapshotHandle {
        let target = self
            .apps
            .iter()
            .find(|app| app.info.pid == pid)
            .map(|app| Target::Node(app.node))
            .unwrap_or(Target::Missing(pid));
        self.mint(target)
    }

    fn system_wide(&self) -> SnapshotHandle {
        self.mint(Target::SystemWide)
    }

    fn element_at(&self, root: &SnapshotHandle, point: Point) -> StoreResult<Option<SnapshotHandle>> {
        let nodes = self.nodes.lock();
        let roots = self.hit_test_roots(&nodes, root.target)?;
        let hit = roots
            .into_iter()
            .find_map(|window| deepest_at(&nodes, window, point));
        Ok(hit.map(|index| self.mint(Target::Node(index))))
    }

    fn running_applications(&self) -> StoreResult<Vec<AppInfo>> {
        Ok(self.apps.iter().map(|app| app.info.clone()).collect())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::sample_store;
    use super::*;

    #[test]
    fn test_handles_are_distinct_but_hash_equal() {
        let store = sample_store();
        let a = store.application(100);
        let b = store.application(100);
        assert_ne!(a, b);
        assert_eq!(store.content_hash(&a), store.content_hash(&b));
    }

    #[test]
    fn test_windows_are_not_children_of_application() {
        let store = sample_store();
        let app = store.application(100);
        let windows = store.elements(&app, Attribute::Windows).unwrap();
        let children = store.elements(&app, Attribute::Children).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(children.len(), 1);
        assert_eq!(
            store.text(&children[0], Attribute::Role).unwrap().as_deref(),
            Some("AXMenuBar")
        );
    }

    #[test]
    fn test_missing_application_is_invalid() {
        let store = sample_store();
        let ghost = store.application(4242);
        assert!(matches!(
            store.attribute(&ghost, Attribute::Role),
            Err(StoreError::InvalidElement)
        ));
    }

    #[test]
    fn test_element_at_returns_deepest_node() {
        let store = sample_store();
        let app = store.application(100);
        let hit = store
            .element_at(&app, Point::new(115.0, 115.0))
            .unwrap()
            .unwrap();
        assert_eq!(
            store.text(&hit, Attribute::Title).unwrap().as_deref(),
            Some("Back")
        );

        let miss = store.element_at(&app, Point::new(2000.0, 2000.0)).unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn test_system_wide_hit_test_reaches_other_apps() {
        let store = sample_store();
        let hit = store
            .element_at(&store.system_wide(), Point::new(950.0, 150.0))
            .unwrap()
            .unwrap();
        assert_eq!(store.pid(&hit).unwrap(), Some(200));
    }

    #[test]
    fn test_set_focus_moves_focus_within_process() {
        let store = sample_store();
        let app = store.application(100);
        let window = store.elements(&app, Attribute::Windows).unwrap().remove(0);
        let toolbar = store.elements(&window, Attribute::Children).unwrap().remove(0);
        store
            .set_attribute(&toolbar, Attribute::Focused, AttrValue::Bool(true))
            .unwrap();

        let field = store.elements(&window, Attribute::Children).unwrap().remove(1);
        assert_eq!(store.flag(&field, Attribute::Focused).unwrap(), Some(false));
        assert_eq!(store.flag(&toolbar, Attribute::Focused).unwrap(), Some(true));
    }

    #[test]
    fn test_unsupported_action_is_platform_error() {
        let store = sample_store();
        let app = store.application(100);
        let window = store.elements(&app, Attribute::Windows).unwrap().remove(0);
        let err = store.perform_action(&window, "AXPress").unwrap_err();
        assert!(matches!(err, StoreError::Platform { code: -25206, .. }));

        store.perform_action(&window, "AXRaise").unwrap();
        assert_eq!(store.performed_actions().len(), 1);
    }

    #[test]
    fn test_snapshot_json_defaults() {
        let snapshot: Snapshot = serde_json::from_str(
            r#"{"applications":[{"pid":7,"name":"Calc","windows":[{"role":"AXWindow"}]}]}"#,
        )
        .unwrap();
        let app = &snapshot.applications[0];
        assert!(app.regular);
        assert!(!app.active);
        assert!(app.windows[0].enabled);
        assert!(app.windows[0].focusable);
    }
}
