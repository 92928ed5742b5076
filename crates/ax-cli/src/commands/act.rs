//! Accessibility actions and attribute writes

use super::{Context, parse_address};
use crate::address::Address;
use crate::errors::AxError;
use crate::lock::Launcher;
use crate::names::{display_name, platform_name};
use crate::store::{AttrValue, Attribute, CapabilityStore};
use ax_protocol::{Point, Size};
use serde_json::{Value, json};

pub async fn action<S: CapabilityStore, L: Launcher>(
    ctx: &Context<'_, S, L>,
    address: &str,
    name: &str,
) -> Result<Value, AxError> {
    let element = ctx.resolver().resolve_element(&parse_address(address)?)?;
    let id = ctx.identity().element_id(&element)?;
    let action = platform_name(name);

    ctx.store.perform_action(&element, &action)?;

    let shown = display_name(&action);
    ctx.notify("action", &format!("Performed {} on {}", shown, id)).await;
    Ok(json!({ "id": id, "action": shown }))
}

pub async fn set_value<S: CapabilityStore, L: Launcher>(
    ctx: &Context<'_, S, L>,
    address: &str,
    value: &str,
) -> Result<Value, AxError> {
    let element = ctx.resolver().resolve_element(&parse_address(address)?)?;
    let id = ctx.identity().element_id(&element)?;

    // Numeric controls keep numeric values
    let current = ctx.store.attribute(&element, Attribute::Value)?;
    let new_value = match (current, value.parse::<f64>()) {
        (Some(AttrValue::Number(_)), Ok(n)) => AttrValue::Number(n),
        _ => AttrValue::Text(value.to_string()),
    };
    ctx.store.set_attribute(&element, Attribute::Value, new_value)?;

    ctx.notify("set", &format!("Set value of {}", id)).await;
    Ok(json!({ "id": id, "value": value }))
}

pub async fn focus<S: CapabilityStore, L: Launcher>(ctx: &Context<'_, S, L>, address: &str) -> Result<Value, AxError> {
    let element = ctx.resolver().resolve_element(&parse_address(address)?)?;
    let id = ctx.identity().element_id(&element)?;

    ctx.store.set_attribute(&element, Attribute::Focused, AttrValue::Bool(true))?;

    ctx.notify("focus", &format!("Focused {}", id)).await;
    Ok(json!({ "id": id, "focused": true }))
}

pub async fn move_to<S: CapabilityStore, L: Launcher>(
    ctx: &Context<'_, S, L>,
    address: &str,
    to: &str,
) -> Result<Value, AxError> {
    let Address::AbsolutePoint { x, y } = parse_address(to)? else {
        return Err(AxError::invalid(format!("move target '{}' must be an @X,Y point", to)));
    };
    let element = ctx.resolver().resolve_element(&parse_address(address)?)?;
    let id = ctx.identity().element_id(&element)?;

    let position = Point::new(x as f64, y as f64);
    ctx.store
        .set_attribute(&element, Attribute::Position, AttrValue::Point(position))?;

    ctx.notify("move", &format!("Moved {} to ({}, {})", id, x, y)).await;
    Ok(json!({ "id": id, "x": x, "y": y }))
}

pub async fn resize<S: CapabilityStore, L: Launcher>(ctx: &Context<'_, S, L>, address: &str) -> Result<Value, AxError> {
    let parsed = parse_address(address)?;
    let (width, height) = parsed
        .size()
        .ok_or_else(|| AxError::invalid(format!("resize needs a +WxH size in '{}'", address)))?;
    let element = ctx.resolver().resolve_element(&parsed)?;
    let id = ctx.identity().element_id(&element)?;

    let size = Size::new(width as f64, height as f64);
    ctx.store.set_attribute(&element, Attribute::Size, AttrValue::Size(size))?;

    ctx.notify("resize", &format!("Resized {} to {}x{}", id, width, height))
        .await;
    Ok(json!({ "id": id, "width": width, "height": height }))
}
