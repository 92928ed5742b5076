//! Capability store seam over the platform accessibility API
//!
//! Every query follows the same contract: an attribute the element does not
//! support, or one that currently has no value, is `Ok(None)`. Only genuine
//! failures (revoked permission, dead element, platform error codes) are
//! `Err`.

use ax_protocol::{Point, Rect, Size};
use thiserror::Error;

/// Attributes the CLI reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Role,
    Subrole,
    RoleDescription,
    Title,
    Description,
    Help,
    Identifier,
    Value,
    Position,
    Size,
    Enabled,
    Focused,
    Children,
    Windows,
    Parent,
}

impl Attribute {
    /// Platform spelling of the attribute
    pub fn platform_name(self) -> &'static str {
        match self {
            Self::Role => "AXRole",
            Self::Subrole => "AXSubrole",
            Self::RoleDescription => "AXRoleDescription",
            Self::Title => "AXTitle",
            Self::Description => "AXDescription",
            Self::Help => "AXHelp",
            Self::Identifier => "AXIdentifier",
            Self::Value => "AXValue",
            Self::Position => "AXPosition",
            Self::Size => "AXSize",
            Self::Enabled => "AXEnabled",
            Self::Focused => "AXFocused",
            Self::Children => "AXChildren",
            Self::Windows => "AXWindows",
            Self::Parent => "AXParent",
        }
    }
}

/// A typed attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue<H> {
    Text(String),
    Number(f64),
    Bool(bool),
    Point(Point),
    Size(Size),
    Rect(Rect),
    Element(H),
    Elements(Vec<H>),
    /// A value shape the CLI has no dedicated rendering for
    Other(String),
}

/// Errors reported by a capability store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("accessibility access has not been granted")]
    PermissionDenied,

    #[error("element is no longer valid")]
    InvalidElement,

    #[error("{context} failed with platform error {code}")]
    Platform { code: i32, context: String },

    #[error("{0}")]
    Unsupported(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A running application as reported by the platform
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AppInfo {
    pub pid: i32,
    pub name: String,
    /// Regular (non-background) application
    #[serde(skip)]
    pub regular: bool,
    pub active: bool,
}

/// Query/attribute-store view of the platform accessibility API
///
/// Handles are ephemeral: two queries for the same UI object may return
/// different handle values. Only [`CapabilityStore::content_hash`] is stable.
pub trait CapabilityStore {
    type Handle: Clone + std::fmt::Debug;

    fn attribute(
        &self,
        element: &Self::Handle,
        attribute: Attribute,
    ) -> StoreResult<Option<AttrValue<Self::Handle>>>;

    /// Read several attributes in one call; results line up with `attributes`
    fn attributes(
        &self,
        element: &Self::Handle,
        attributes: &[Attribute],
    ) -> StoreResult<Vec<Option<AttrValue<Self::Handle>>>> {
        attributes
            .iter()
            .map(|attr| self.attribute(element, *attr))
            .collect()
    }

    /// Platform names of the actions the element supports
    fn actions(&self, element: &Self::Handle) -> StoreResult<Vec<String>>;

    fn perform_action(&self, element: &Self::Handle, action: &str) -> StoreResult<()>;

    fn set_attribute(
        &self,
        element: &Self::Handle,
        attribute: Attribute,
        value: AttrValue<Self::Handle>,
    ) -> StoreResult<()>;

    /// Owning process id, `None` when the platform cannot report one
    fn pid(&self, element: &Self::Handle) -> StoreResult<Option<i32>>;

    /// Hash of the underlying UI object, stable across handle values
    fn content_hash(&self, element: &Self::Handle) -> u64;

    /// Root element of a process. Not checked for liveness.
    fn application(&self, pid: i32) -> Self::Handle;

    /// Root spanning every application on screen
    fn system_wide(&self) -> Self::Handle;

    /// Deepest element under `point` within the tree rooted at `root`
    fn element_at(&self, root: &Self::Handle, point: Point) -> StoreResult<Option<Self::Handle>>;

    fn running_applications(&self) -> StoreResult<Vec<AppInfo>>;

    fn frontmost_application(&self) -> StoreResult<Option<i32>> {
        Ok(self
            .running_applications()?
            .into_iter()
            .find(|app| app.active)
            .map(|app| app.pid))
    }

    /// Elements behind a list-valued attribute such as children or windows
    fn elements(
        &self,
        element: &Self::Handle,
        attribute: Attribute,
    ) -> StoreResult<Vec<Self::Handle>> {
        Ok(match self.attribute(element, attribute)? {
            Some(AttrValue::Elements(list)) => list,
            Some(AttrValue::Element(single)) => vec![single],
            _ => Vec::new(),
        })
    }

    fn position(&self, element: &Self::Handle) -> StoreResult<Option<Point>> {
        Ok(match self.attribute(element, Attribute::Position)? {
            Some(AttrValue::Point(p)) => Some(p),
            _ => None,
        })
    }

    fn size(&self, element: &Self::Handle) -> StoreResult<Option<Size>> {
        Ok(match self.attribute(element, Attribute::Size)? {
            Some(AttrValue::Size(s)) => Some(s),
            _ => None,
        })
    }

    /// On-screen frame, present only when both position and size are
    fn frame(&self, element: &Self::Handle) -> StoreResult<Option<Rect>> {
        let origin = self.position(element)?;
        let size = self.size(element)?;
        Ok(origin
            .zip(size)
            .map(|(origin, size)| Rect::from_origin_size(origin, size)))
    }

    fn text(&self, element: &Self::Handle, attribute: Attribute) -> StoreResult<Option<String>> {
        Ok(match self.attribute(element, attribute)? {
            Some(AttrValue::Text(s)) => Some(s),
            _ => None,
        })
    }

    fn flag(&self, element: &Self::Handle, attribute: Attribute) -> StoreResult<Option<bool>> {
        Ok(match self.attribute(element, attribute)? {
            Some(AttrValue::Bool(b)) => Some(b),
            _ => None,
        })
    }
}

/// Store used when no accessibility backend is configured
///
/// Every query fails with [`StoreError::PermissionDenied`].
#[derive(Debug, Default)]
pub struct UnavailableStore;

impl CapabilityStore for UnavailableStore {
    type Handle = ();

    fn attribute(&self, _: &(), _: Attribute) -> StoreResult<Option<AttrValue<()>>> {
        Err(StoreError::PermissionDenied)
    }

    fn actions(&self, _: &()) -> StoreResult<Vec<String>> {
        Err(StoreError::PermissionDenied)
    }

    fn perform_action(&self, _: &(), _: &str) -> StoreResult<()> {
        Err(StoreError::PermissionDenied)
    }

    fn set_attribute(&self, _: &(), _: Attribute, _: AttrValue<()>) -> StoreResult<()> {
        Err(StoreError::PermissionDenied)
    }

    fn pid(&self, _: &()) -> StoreResult<Option<i32>> {
        Err(StoreError::PermissionDenied)
    }

    fn content_hash(&self, _: &()) -> u64 {
        0
    }

    fn application(&self, _: i32) -> Self::Handle {}

    fn system_wide(&self) -> Self::Handle {}

    fn element_at(&self, _: &(), _: Point) -> StoreResult<Option<()>> {
        Err(StoreError::PermissionDenied)
    }

    fn running_applications(&self) -> StoreResult<Vec<AppInfo>> {
        Err(StoreError::PermissionDenied)
    }
}
