//! Address grammar
//!
//! One token names a point, a rect, a process or an element:
//!
//! | Form | Address |
//! |---|---|
//! | `@x,y` | absolute point |
//! | `@x,y+WxH` | absolute rect |
//! | `pid` | process |
//! | `pid:hash` | element |
//! | `pid:hash+WxH` | element origin with explicit size |
//! | `pid:hash@dx,dy` | point offset from element origin |
//! | `pid:hash@dx,dy+WxH` | rect offset from element origin |

use crate::errors::AxError;
use crate::identity::ElementId;
use std::fmt;
use std::str::FromStr;

/// A parsed address token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    AbsolutePoint {
        x: i64,
        y: i64,
    },
    AbsoluteRect {
        x: i64,
        y: i64,
        width: u64,
        height: u64,
    },
    Process {
        pid: i32,
    },
    Element {
        id: ElementId,
    },
    ElementRect {
        id: ElementId,
        width: u64,
        height: u64,
    },
    ElementOffset {
        id: ElementId,
        dx: i64,
        dy: i64,
    },
    ElementOffsetRect {
        id: ElementId,
        dx: i64,
        dy: i64,
        width: u64,
        height: u64,
    },
}

/// Classification used to pick a resolution strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Point,
    Rect,
    Process,
    Element,
}

impl Address {
    pub fn kind(&self) -> AddressKind {
        match self {
            Self::AbsolutePoint { .. } | Self::ElementOffset { .. } => AddressKind::Point,
            Self::AbsoluteRect { .. } | Self::ElementRect { .. } | Self::ElementOffsetRect { .. } => {
                AddressKind::Rect
            }
            Self::Process { .. } => AddressKind::Process,
            Self::Element { .. } => AddressKind::Element,
        }
    }

    /// Explicit `+WxH` size, if the token carried one
    pub fn size(&self) -> Option<(u64, u64)> {
        match *self {
            Self::AbsoluteRect { width, height, .. }
            | Self::ElementRect { width, height, .. }
            | Self::ElementOffsetRect { width, height, .. } => Some((width, height)),
            _ => None,
        }
    }

    /// Element the address is anchored to, if any
    pub fn element(&self) -> Option<ElementId> {
        match *self {
            Self::Element { id }
            | Self::ElementRect { id, .. }
            | Self::ElementOffset { id, .. }
            | Self::ElementOffsetRect { id, .. } => Some(id),
            _ => None,
        }
    }
}

impl FromStr for Address {
    type Err = AxError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        parse_address(token).ok_or_else(|| AxError::invalid(format!("invalid address '{}'", token)))
    }
}

fn parse_address(token: &str) -> Option<Address> {
    if let Some(rest) = token.strip_prefix('@') {
        return match rest.split_once('+') {
            Some((coords, size)) => {
                let (x, y) = parse_pair(coords)?;
                let (width, height) = parse_size(size)?;
                Some(Address::AbsoluteRect {
                    x,
                    y,
                    width,
                    height,
                })
            }
            None => {
                let (x, y) = parse_pair(rest)?;
                Some(Address::AbsolutePoint { x, y })
            }
        };
    }

    if let Some(colon) = token.find(':') {
        if !token[..colon].contains(['@', '+']) {
            return parse_element(token);
        }
        return None;
    }

    token.parse().ok().map(|pid| Address::Process { pid })
}

fn parse_element(token: &str) -> Option<Address> {
    let mut rest = token;

    let mut size = None;
    if let Some(plus) = rest.rfind('+') {
        if rest[plus + 1..].contains('x') {
            size = Some(parse_size(&rest[plus + 1..])?);
            rest = &rest[..plus];
        }
    }

    let mut offset = None;
    let colon = rest.find(':')?;
    if let Some(at) = rest.rfind('@') {
        if at > colon {
            offset = Some(parse_pair(&rest[at + 1..])?);
            rest = &rest[..at];
        }
    }

    let id: ElementId = rest.parse().ok()?;
    Some(match (offset, size) {
        (None, None) => Address::Element { id },
        (None, Some((width, height))) => Address::ElementRect { id, width, height },
        (Some((dx, dy)), None) => Address::ElementOffset { id, dx, dy },
        (Some((dx, dy)), Some((width, height))) => Address::ElementOffsetRect {
            id,
            dx,
            dy,
            width,
            height,
        },
    })
}

/// `x,y` with signed components
fn parse_pair(s: &str) -> Option<(i64, i64)> {
    let (a, b) = s.split_once(',')?;
    Some((a.parse().ok()?, b.parse().ok()?))
}

/// `WxH` with unsigned components
fn parse_size(s: &str) -> Option<(u64, u64)> {
    let (w, h) = s.split_once('x')?;
    if w.starts_with('+') || h.starts_with('+') {
        return None;
    }
    Some((w.parse().ok()?, h.parse().ok()?))
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AbsolutePoint { x, y } => write!(f, "@{},{}", x, y),
            Self::AbsoluteRect {
                x,
                y,
                width,
                height,
            } => write!(f, "@{},{}+{}x{}", x, y, width, height),
            Self::Process { pid } => write!(f, "{}", pid),
            Self::Element { id } => write!(f, "{}", id),
            Self::ElementRect { id, width, height } => write!(f, "{}+{}x{}", id, width, height),
            Self::ElementOffset { id, dx, dy } => write!(f, "{}@{},{}", id, dx, dy),
            Self::ElementOffsetRect {
                id,
                dx,
                dy,
                width,
                height,
            } => write!(f, "{}@{},{}+{}x{}", id, dx, dy, width, height),
        }
    }
}
