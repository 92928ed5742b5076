//! Address resolution
//!
//! Turns a parsed [`Address`] into a screen point, a screen rect or a live
//! element handle. Every address variant has a defined result or a defined
//! failure for each of the three.

use crate::address::Address;
use crate::constants::REGION_SEARCH_DEPTH;
use crate::errors::AxError;
use crate::identity::{ElementId, IdentityEngine};
use crate::store::{Attribute, CapabilityStore};
use ax_protocol::{Point, Rect};
use serde::Serialize;

/// A point plus the element it was derived from
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedPoint {
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ElementId>,
}

impl ResolvedPoint {
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// A rect plus the element it was derived from
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ElementId>,
}

impl ResolvedRect {
    fn new(rect: Rect, id: Option<ElementId>) -> Self {
        Self {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            id,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

fn no_point_for_process(pid: i32) -> AxError {
    AxError::invalid(format!("process address {} does not name a point or region", pid))
}

pub struct Resolver<'a, S: CapabilityStore> {
    identity: IdentityEngine<'a, S>,
}

impl<'a, S: CapabilityStore> Resolver<'a, S> {
    pub fn new(identity: IdentityEngine<'a, S>) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> IdentityEngine<'a, S> {
        self.identity
    }

    fn store(&self) -> &'a S {
        self.identity.store()
    }

    fn origin_of(&self, id: &ElementId) -> Result<Point, AxError> {
        let handle = self.identity.lookup_id(id)?;
        self.store()
            .position(&handle)?
            .ok_or_else(|| AxError::not_found(format!("element {} has no position", id)))
    }

    pub fn resolve_point(&self, address: &Address) -> Result<ResolvedPoint, AxError> {
        let (point, id) = match *address {
            Address::AbsolutePoint { x, y } | Address::AbsoluteRect { x, y, .. } => {
                (Point::new(x as f64, y as f64), None)
            }
            Address::Element { id } | Address::ElementRect { id, .. } => (self.origin_of(&id)?, Some(id)),
            Address::ElementOffset { id, dx, dy } | Address::ElementOffsetRect { id, dx, dy, .. } => {
                (self.origin_of(&id)?.offset(dx as f64, dy as f64), Some(id))
            }
            Address::Process { pid } => return Err(no_point_for_process(pid)),
        };
        Ok(ResolvedPoint {
            x: point.x,
            y: point.y,
            id,
        })
    }

    pub fn resolve_rect(&self, address: &Address) -> Result<ResolvedRect, AxError> {
        match *address {
            Address::AbsolutePoint { x, y } => Ok(ResolvedRect::new(Rect::new(x as f64, y as f64, 1.0, 1.0), None)),
            Address::AbsoluteRect {
                x,
                y,
                width,
                height,
            } => Ok(ResolvedRect::new(
                Rect::new(x as f64, y as f64, width as f64, height as f64),
                None,
            )),
            Address::Element { id } => {
                let handle = self.identity.lookup_id(&id)?;
                let frame = self
                    .store()
                    .frame(&handle)?
                    .ok_or_else(|| AxError::not_found(format!("element {} has no frame", id)))?;
                Ok(ResolvedRect::new(frame, Some(id)))
            }
            Address::Process { pid } => Err(no_point_for_process(pid)),
            _ => {
                let origin = self.resolve_point(address)?;
                let (width, height) = address.size().unwrap_or((1, 1));
                Ok(ResolvedRect::new(
                    Rect::new(origin.x, origin.y, width as f64, height as f64),
                    origin.id,
                ))
            }
        }
    }

    pub fn resolve_element(&self, address: &Address) -> Result<S::Handle, AxError> {
        match *address {
            Address::AbsolutePoint { x, y } | Address::AbsoluteRect { x, y, .. } => {
                self.hit_test(Point::new(x as f64, y as f64))
            }
            Address::Element { id } | Address::ElementRect { id, .. } => self.identity.lookup_id(&id),
            Address::ElementOffset { .. } | Address::ElementOffsetRect { .. } => {
                let target = self.resolve_point(address)?;
                self.hit_test(target.point())
            }
            Address::Process { pid } => Ok(self.store().application(pid)),
        }
    }

    /// Element under a screen point, frontmost application first
    pub fn hit_test(&self, point: Point) -> Result<S::Handle, AxError> {
        let store = self.store();

        if let Ok(Some(pid)) = store.frontmost_application() {
            match store.element_at(&store.application(pid), point) {
                Ok(Some(handle)) => return Ok(handle),
                Ok(None) => {}
                Err(e) => tracing::debug!(pid, "frontmost hit test failed: {}", e),
            }
        }

        store
            .element_at(&store.system_wide(), point)?
            .ok_or_else(|| AxError::not_found(format!("no element at ({}, {})", point.x, point.y)))
    }

    /// Windows and descendants of regular applications whose frames intersect `rect`
    pub fn elements_in_rect(&self, rect: Rect) -> Result<Vec<S::Handle>, AxError> {
        let store = self.store();
        let mut found = Vec::new();

        for app in store.running_applications()?.into_iter().filter(|a| a.regular) {
            let root = store.application(app.pid);
            for window in store.elements(&root, Attribute::Windows).unwrap_or_default() {
                match store.frame(&window) {
                    Ok(Some(frame)) if frame.intersects(&rect) => {
                        found.push(window.clone());
                        self.collect_in_rect(&window, rect, 1, &mut found);
                    }
                    _ => {}
                }
            }
        }
        Ok(found)
    }

    fn collect_in_rect(&self, node: &S::Handle, rect: Rect, depth: usize, found: &mut Vec<S::Handle>) {
        if depth > REGION_SEARCH_DEPTH {
            return;
        }
        let store = self.store();
        for child in store.elements(node, Attribute::Children).unwrap_or_default() {
            match store.frame(&child).ok().flatten() {
                Some(frame) if frame.intersects(&rect) => {
                    found.push(child.clone());
                    self.collect_in_rect(&child, rect, depth + 1, found);
                }
                Some(_) => {}
                // Frameless groups may still hold visible children
                None => self.collect_in_rect(&child, rect, depth + 1, found),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ElementRegistry;
    use crate::snapshot::fixtures::sample_store;
    use crate::snapshot::{AppSnapshot, NodeSnapshot, Snapshot, SnapshotStore};

    fn window_id(store: &SnapshotStore, engine: IdentityEngine<'_, SnapshotStore>) -> ElementId {
        let window = store
            .elements(&store.application(100), Attribute::Windows)
            .unwrap()
            .remove(0);
        engine.element_id(&window).unwrap()
    }

    #[test]
    fn test_point_address_as_rect_is_one_by_one() {
        let store = sample_store();
        let registry = ElementRegistry::new();
        let resolver = Resolver::new(IdentityEngine::new(&store, &registry));

        let rect = resolver.resolve_rect(&"@500,300".parse().unwrap()).unwrap();
        assert_eq!(rect.rect(), Rect::new(500.0, 300.0, 1.0, 1.0));
        assert_eq!(rect.id, None);
    }

    #[test]
    fn test_process_address_has_no_point() {
        let store = sample_store();
        let registry = ElementRegistry::new();
        let resolver = Resolver::new(IdentityEngine::new(&store, &registry));

        let address: Address = "100".parse().unwrap();
        assert!(matches!(resolver.resolve_point(&address), Err(AxError::InvalidArguments(_))));
        assert!(matches!(resolver.resolve_rect(&address), Err(AxError::InvalidArguments(_))));
    }

    #[test]
    fn test_element_addresses() {
        let store = sample_store();
        let registry = ElementRegistry::new();
        let engine = IdentityEngine::new(&store, &registry);
        let resolver = Resolver::new(engine);
        let id = window_id(&store, engine);

        let point = resolver.resolve_point(&format!("{id}").parse().unwrap()).unwrap();
        assert_eq!(point.point(), Point::new(100.0, 100.0));
        assert_eq!(point.id, Some(id));

        let frame = resolver.resolve_rect(&format!("{id}").parse().unwrap()).unwrap();
        assert_eq!(frame.rect(), Rect::new(100.0, 100.0, 800.0, 600.0));

        let sized = resolver.resolve_rect(&format!("{id}+40x30").parse().unwrap()).unwrap();
        assert_eq!(sized.rect(), Rect::new(100.0, 100.0, 40.0, 30.0));

        let offset = resolver.resolve_rect(&format!("{id}@-5,10").parse().unwrap()).unwrap();
        assert_eq!(offset.rect(), Rect::new(95.0, 110.0, 1.0, 1.0));
        assert_eq!(offset.id, Some(id));
    }

    #[test]
    fn test_offset_element_is_hit_tested() {
        let store = sample_store();
        let registry = ElementRegistry::new();
        let engine = IdentityEngine::new(&store, &registry);
        let resolver = Resolver::new(engine);
        let id = window_id(&store, engine);

        // 事後条件: オフセット先に見えている要素が返る
        let field = resolver
            .resolve_element(&format!("{id}@510,15").parse().unwrap())
            .unwrap();
        assert_eq!(
            store.text(&field, Attribute::Role).unwrap().as_deref(),
            Some("AXTextField")
        );
    }

    #[test]
    fn test_hit_test_falls_back_to_system_wide() {
        let store = sample_store();
        let registry = ElementRegistry::new();
        let resolver = Resolver::new(IdentityEngine::new(&store, &registry));

        let hit = resolver.resolve_element(&"@1000,200".parse().unwrap()).unwrap();
        assert_eq!(store.pid(&hit).unwrap(), Some(200));

        let miss = resolver.resolve_element(&"@5000,5000".parse().unwrap());
        assert!(matches!(miss, Err(AxError::NotFound(_))));
    }

    #[test]
    fn test_process_address_resolves_to_root() {
        let store = sample_store();
        let registry = ElementRegistry::new();
        let resolver = Resolver::new(IdentityEngine::new(&store, &registry));

        let root = resolver.resolve_element(&"200".parse().unwrap()).unwrap();
        assert_eq!(store.text(&root, Attribute::Title).unwrap().as_deref(), Some("Notes"));
    }

    #[test]
    fn test_elements_in_rect() {
        let store = sample_store();
        let registry = ElementRegistry::new();
        let resolver = Resolver::new(IdentityEngine::new(&store, &registry));

        let found = resolver
            .elements_in_rect(Rect::new(108.0, 108.0, 10.0, 10.0))
            .unwrap();
        let roles: Vec<String> = found
            .iter()
            .filter_map(|h| store.text(h, Attribute::Role).unwrap())
            .collect();
        assert_eq!(roles, vec!["AXWindow", "AXToolbar", "AXButton"]);
    }

    #[test]
    fn test_elements_in_rect_stops_at_search_depth() {
        let mut node = NodeSnapshot::new("AXGroup")
            .with_title("level 12")
            .with_frame(0.0, 0.0, 100.0, 100.0);
        for level in (1..12).rev() {
            node = NodeSnapshot::new("AXGroup")
                .with_title(format!("level {level}"))
                .with_frame(0.0, 0.0, 100.0, 100.0)
                .with_child(node);
        }
        let window = NodeSnapshot::new("AXWindow")
            .with_frame(0.0, 0.0, 100.0, 100.0)
            .with_child(node);
        let store = SnapshotStore::from_snapshot(Snapshot {
            applications: vec![AppSnapshot::new(1, "Deep").with_window(window)],
            screen_image: None,
        });
        let registry = ElementRegistry::new();
        let resolver = Resolver::new(IdentityEngine::new(&store, &registry));

        let found = resolver
            .elements_in_rect(Rect::new(10.0, 10.0, 5.0, 5.0))
            .unwrap();
        let titles: Vec<String> = found
            .iter()
            .filter_map(|h| store.text(h, Attribute::Title).unwrap())
            .collect();

        // 事後条件: 深さ 10 までの子孫だけが返り、11 と 12 は含まれない
        let expected: Vec<String> = (1..=REGION_SEARCH_DEPTH).map(|l| format!("level {l}")).collect();
        assert_eq!(titles, expected);
        assert_eq!(found.len(), REGION_SEARCH_DEPTH + 1);
    }
}
