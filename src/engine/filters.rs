//! Layered panel filter resolution
//!
//! Each panel's effective filter set is resolved per dimension from three
//! independent layers: a user override on the panel itself, the global
//! dashboard filters, and the panel's saved defaults. A non-empty layer wins;
//! an empty set is the "all" sentinel and falls through to the next layer.

use std::collections::BTreeSet;

use crate::engine::models::{DateRange, FilterState};

fn pick(
    user: Option<&BTreeSet<i64>>,
    global: &BTreeSet<i64>,
    default: &BTreeSet<i64>,
) -> BTreeSet<i64> {
    if let Some(user) = user {
        if !user.is_empty() {
            return user.clone();
        }
    }
    if !global.is_empty() {
        return global.clone();
    }
    default.clone()
}

/// Resolve one panel's effective filters.
///
/// Per dimension independently: a non-empty user override wins (a panel the
/// user has touched is fully independent), else non-empty global filters win
/// over the panel's saved defaults, else the defaults apply. Every dimension
/// resolves to a concrete set; absent configuration resolves to the empty
/// "all" sentinel, never to a synthesized default.
pub fn resolve(
    panel_defaults: &FilterState,
    user_override: Option<&FilterState>,
    global: &FilterState,
) -> FilterState {
    FilterState {
        events: pick(
            user_override.map(|o| &o.events),
            &global.events,
            &panel_defaults.events,
        ),
        platforms: pick(
            user_override.map(|o| &o.platforms),
            &global.platforms,
            &panel_defaults.platforms,
        ),
        pos: pick(
            user_override.map(|o| &o.pos),
            &global.pos,
            &panel_defaults.pos,
        ),
        sources: pick(
            user_override.map(|o| &o.sources),
            &global.sources,
            &panel_defaults.sources,
        ),
    }
}

/// Resolve one panel's effective date range: the panel's own range when it
/// has diverged, otherwise the global range.
pub fn resolve_date_range(panel_override: Option<DateRange>, global: DateRange) -> DateRange {
    panel_override.unwrap_or(global)
}
