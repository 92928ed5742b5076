//! Synthetic input commands

use super::{Context, parse_address};
use crate::address::Address;
use crate::errors::AxError;
use crate::identity::ElementId;
use crate::input::{self, MouseButton};
use crate::keys::KeyCombo;
use crate::lock::Launcher;
use crate::resolve::ResolvedPoint;
use crate::store::{AttrValue, Attribute, CapabilityStore};
use ax_protocol::Point;
use serde_json::{Value, json};

/// Centre of the element's frame
fn center_of<S: CapabilityStore, L: Launcher>(
    ctx: &Context<'_, S, L>,
    element: &S::Handle,
    id: &ElementId,
) -> Result<Point, AxError> {
    ctx.store
        .frame(element)?
        .map(|frame| frame.center())
        .ok_or_else(|| AxError::action_failed(format!("element {} has no frame to click", id)))
}

/// Click target: a bare element id means its centre, anything else its resolved point
fn click_target<S: CapabilityStore, L: Launcher>(
    ctx: &Context<'_, S, L>,
    address: &Address,
) -> Result<ResolvedPoint, AxError> {
    match *address {
        Address::Element { id } => {
            let element = ctx.identity().lookup_id(&id)?;
            let center = center_of(ctx, &element, &id)?;
            Ok(ResolvedPoint {
                x: center.x,
                y: center.y,
                id: Some(id),
            })
        }
        _ => ctx.resolver().resolve_point(address),
    }
}

pub async fn click<S: CapabilityStore, L: Launcher>(
    ctx: &mut Context<'_, S, L>,
    address: &str,
    button: MouseButton,
    double: bool,
) -> Result<Value, AxError> {
    let target = click_target(ctx, &parse_address(address)?)?;

    if double {
        input::double_click(ctx.input, target.point(), button)?;
    } else {
        input::click(ctx.input, target.point(), button)?;
    }

    let verb = if double { "Double-clicked" } else { "Clicked" };
    ctx.notify("click", &format!("{} at ({}, {})", verb, target.x, target.y))
        .await;

    let mut result = json!({ "x": target.x, "y": target.y, "button": button, "double": double });
    if let Some(id) = target.id {
        result["id"] = json!(id);
    }
    Ok(result)
}

pub async fn type_text<S: CapabilityStore, L: Launcher>(
    ctx: &mut Context<'_, S, L>,
    text: &str,
    into: Option<&str>,
) -> Result<Value, AxError> {
    let mut result = json!({ "typed": text.chars().count() });

    if let Some(token) = into {
        let element = ctx.resolver().resolve_element(&parse_address(token)?)?;
        let id = ctx.identity().element_id(&element)?;

        let method = match ctx
            .store
            .set_attribute(&element, Attribute::Focused, AttrValue::Bool(true))
        {
            Ok(()) => "focus",
            Err(e) => {
                tracing::debug!("focus failed for {}, clicking instead: {}", id, e);
                let center = center_of(ctx, &element, &id)?;
                input::click(ctx.input, center, MouseButton::Left)?;
                "click"
            }
        };
        result["id"] = json!(id);
        result["method"] = json!(method);
    }

    input::type_text(ctx.input, text)?;

    ctx.notify("type", &format!("Typed {} characters", text.chars().count()))
        .await;
    Ok(result)
}

pub async fn key<S: CapabilityStore, L: Launcher>(
    ctx: &mut Context<'_, S, L>,
    combo: &str,
    repeat: u32,
) -> Result<Value, AxError> {
    let parsed: KeyCombo = combo.parse()?;
    if repeat == 0 {
        return Err(AxError::invalid("repeat must be at least 1"));
    }

    input::press_key(ctx.input, &parsed, repeat)?;

    ctx.notify("key", &format!("Pressed {} x{}", parsed, repeat)).await;
    Ok(json!({ "key": parsed.to_string(), "repeat": repeat }))
}

pub async fn scroll<S: CapabilityStore, L: Launcher>(
    ctx: &mut Context<'_, S, L>,
    address: &str,
    dx: i32,
    dy: i32,
) -> Result<Value, AxError> {
    let target = ctx.resolver().resolve_point(&parse_address(address)?)?;

    input::scroll(ctx.input, target.point(), dx, dy)?;

    ctx.notify(
        "scroll",
        &format!("Scrolled ({}, {}) at ({}, {})", dx, dy, target.x, target.y),
    )
    .await;
    Ok(json!({ "x": target.x, "y": target.y, "dx": dx, "dy": dy }))
}

pub async fn drag<S: CapabilityStore, L: Launcher>(
    ctx: &mut Context<'_, S, L>,
    from: &str,
    to: &str,
    button: MouseButton,
) -> Result<Value, AxError> {
    let resolver = ctx.resolver();
    let start = resolver.resolve_point(&parse_address(from)?)?;
    let end = resolver.resolve_point(&parse_address(to)?)?;

    input::drag(ctx.input, start.point(), end.point(), button)?;

    ctx.notify(
        "drag",
        &format!("Dragged from ({}, {}) to ({}, {})", start.x, start.y, end.x, end.y),
    )
    .await;
    Ok(json!({
        "from": { "x": start.x, "y": start.y },
        "to": { "x": end.x, "y": end.y },
        "button": button,
    }))
}

#[cfg(test)]
mod tests {
    use super::super::Command;
    use super::super::harness::Harness;
    use crate::errors::AxError;
    use crate::input::recording::Recorded;
    use crate::input::{MouseButton, Press};
    use ax_protocol::Point;

    #[tokio::test]
    async fn test_click_absolute_point() {
        let mut h = Harness::new();
        let result = h
            .run(Command::Click {
                address: "@10,20".into(),
                button: MouseButton::Left,
                double: false,
            })
            .await
            .unwrap();
        assert_eq!(result["x"], 10.0);
        assert!(result.get("id").is_none());
        assert_eq!(
            h.sink.events,
            vec![
                Recorded::Move(Point::new(10.0, 20.0)),
                Recorded::Button(MouseButton::Left, Press::Down, 1),
                Recorded::Button(MouseButton::Left, Press::Up, 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_click_element_hits_frame_center() {
        let mut h = Harness::new();
        let id = h.id_of("Back");
        let result = h
            .run(Command::Click {
                address: id.clone(),
                button: MouseButton::Right,
                double: true,
            })
            .await
            .unwrap();

        assert_eq!(result["id"], id);
        assert_eq!(h.sink.events[0], Recorded::Move(Point::new(125.0, 125.0)));
        assert_eq!(h.sink.events.len(), 5);
    }

    #[tokio::test]
    async fn test_click_element_offset_is_relative_to_origin() {
        let mut h = Harness::new();
        let id = h.id_of("Documents");
        h.run(Command::Click {
            address: format!("{id}@5,-5"),
            button: MouseButton::Left,
            double: false,
        })
        .await
        .unwrap();
        assert_eq!(h.sink.events[0], Recorded::Move(Point::new(105.0, 95.0)));
    }

    #[tokio::test]
    async fn test_click_process_address_is_invalid() {
        let mut h = Harness::new();
        let err = h
            .run(Command::Click {
                address: "100".into(),
                button: MouseButton::Left,
                double: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AxError::InvalidArguments(_)));
        assert!(h.sink.events.is_empty());
    }

    #[tokio::test]
    async fn test_type_into_focuses_first() {
        let mut h = Harness::new();
        let id = h.id_of("Back");
        let result = h
            .run(Command::Type {
                text: "héllo".into(),
                into: Some(id),
            })
            .await
            .unwrap();
        assert_eq!(result["method"], "focus");
        assert_eq!(result["typed"], 5);
        assert_eq!(h.sink.events, vec![Recorded::Text("héllo".into())]);
    }

    #[tokio::test]
    async fn test_type_into_falls_back_to_click() {
        let mut h = Harness::new();
        // メニューバーはフォーカス不可
        let id = h.id_of_role("menu_bar");
        let result = h
            .run(Command::Type {
                text: "x".into(),
                into: Some(id),
            })
            .await
            .unwrap();
        assert_eq!(result["method"], "click");
        assert_eq!(h.sink.events[0], Recorded::Move(Point::new(720.0, 12.0)));
        assert_eq!(h.sink.events.last(), Some(&Recorded::Text("x".into())));
    }

    #[tokio::test]
    async fn test_key_with_repeat() {
        let mut h = Harness::new();
        let result = h
            .run(Command::Key {
                combo: "shift+cmd+s".into(),
                repeat: 2,
            })
            .await
            .unwrap();
        assert_eq!(result["key"], "cmd+shift+s");
        assert_eq!(h.sink.events, vec![Recorded::Key("cmd+shift+s".into()); 2]);
    }

    #[tokio::test]
    async fn test_key_rejects_bad_combo() {
        let mut h = Harness::new();
        let err = h
            .run(Command::Key {
                combo: "cmd+".into(),
                repeat: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AxError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_scroll_moves_then_scrolls() {
        let mut h = Harness::new();
        h.run(Command::Scroll {
            address: "@300,400".into(),
            dx: 0,
            dy: -3,
        })
        .await
        .unwrap();
        assert_eq!(
            h.sink.events,
            vec![Recorded::Move(Point::new(300.0, 400.0)), Recorded::Scroll(0, -3)]
        );
    }

    #[tokio::test]
    async fn test_drag_between_points() {
        let mut h = Harness::new();
        let result = h
            .run(Command::Drag {
                from: "@0,0".into(),
                to: "@50,60".into(),
                button: MouseButton::Left,
            })
            .await
            .unwrap();
        assert_eq!(result["to"]["y"], 60.0);
        assert_eq!(h.sink.events[2], Recorded::Drag(Point::new(50.0, 60.0), MouseButton::Left));
    }
}
