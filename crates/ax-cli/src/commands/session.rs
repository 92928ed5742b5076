//! Lock session commands

use super::{Context, to_json};
use crate::errors::AxError;
use crate::lock::Launcher;
use crate::store::CapabilityStore;
use serde_json::Value;

pub fn lock<S: CapabilityStore, L: Launcher>(ctx: &Context<'_, S, L>, timeout: Option<u64>) -> Result<Value, AxError> {
    to_json(&ctx.lock.lock(timeout)?)
}

pub fn unlock<S: CapabilityStore, L: Launcher>(ctx: &Context<'_, S, L>) -> Result<Value, AxError> {
    to_json(&ctx.lock.unlock()?)
}

pub fn status<S: CapabilityStore, L: Launcher>(ctx: &Context<'_, S, L>) -> Result<Value, AxError> {
    to_json(&ctx.lock.status())
}
