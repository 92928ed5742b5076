//! Read-only commands: apps, tree, find, region, actions

use super::{Context, parse_address, to_json};
use crate::errors::AxError;
use crate::lock::Launcher;
use crate::names::display_name;
use crate::store::CapabilityStore;
use serde_json::{Value, json};

pub fn apps<S: CapabilityStore, L: Launcher>(ctx: &Context<'_, S, L>) -> Result<Value, AxError> {
    let apps: Vec<_> = ctx
        .store
        .running_applications()?
        .into_iter()
        .filter(|app| app.regular)
        .collect();
    to_json(&apps)
}

pub fn tree<S: CapabilityStore, L: Launcher>(
    ctx: &Context<'_, S, L>,
    address: Option<&str>,
    depth: Option<usize>,
) -> Result<Value, AxError> {
    let root = match address {
        Some(token) => ctx.resolver().resolve_element(&parse_address(token)?)?,
        None => {
            let pid = ctx
                .store
                .frontmost_application()?
                .ok_or_else(|| AxError::not_found("no frontmost application"))?;
            ctx.store.application(pid)
        }
    };
    to_json(&ctx.tree_builder().build(&root, depth)?)
}

pub fn find<S: CapabilityStore, L: Launcher>(ctx: &Context<'_, S, L>, address: &str) -> Result<Value, AxError> {
    let element = ctx.resolver().resolve_element(&parse_address(address)?)?;
    to_json(&ctx.tree_builder().describe(&element)?)
}

pub fn region<S: CapabilityStore, L: Launcher>(ctx: &Context<'_, S, L>, address: &str) -> Result<Value, AxError> {
    let resolver = ctx.resolver();
    let rect = resolver.resolve_rect(&parse_address(address)?)?;
    let builder = ctx.tree_builder();

    let mut elements = Vec::new();
    for handle in resolver.elements_in_rect(rect.rect())? {
        match builder.describe(&handle) {
            Ok(node) => elements.push(node),
            Err(e) => tracing::debug!("skipping element in region: {}", e),
        }
    }

    Ok(json!({
        "rect": to_json(&rect)?,
        "count": elements.len(),
        "elements": to_json(&elements)?,
    }))
}

pub fn actions<S: CapabilityStore, L: Launcher>(ctx: &Context<'_, S, L>, address: &str) -> Result<Value, AxError> {
    let element = ctx.resolver().resolve_element(&parse_address(address)?)?;
    let id = ctx.identity().element_id(&element)?;
    let actions: Vec<String> = ctx
        .store
        .actions(&element)?
        .iter()
        .map(|a| display_name(a))
        .collect();
    Ok(json!({ "id": id, "actions": actions }))
}
