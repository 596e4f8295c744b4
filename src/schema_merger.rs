//! Deterministic merging of schema fragments.
//!
//! Repeated observations of the same field or response are folded together so
//! that the document only ever widens:
//!
//! - objects take the union of their properties, recursing on shared keys
//! - arrays merge their item shapes
//! - scalars keep the first observed example
//! - a type conflict keeps the first observed type and ignores the newcomer
//!
//! An untyped fragment (the items of an empty array) is replaced by the first
//! typed observation.

use crate::type_inferencer::{SchemaFragment, SchemaType};
use log::debug;
use std::collections::BTreeMap;

/// Merges `incoming` into `existing`, returning the canonical fragment.
pub fn merge(existing: Option<SchemaFragment>, incoming: SchemaFragment) -> SchemaFragment {
    match existing {
        None => incoming,
        Some(mut existing) => {
            merge_fragment(&mut existing, incoming);
            existing
        }
    }
}

/// In-place variant of [`merge`] for fragments held in an `Option` slot.
pub fn merge_into(slot: &mut Option<SchemaFragment>, incoming: SchemaFragment) {
    match slot {
        None => *slot = Some(incoming),
        Some(existing) => merge_fragment(existing, incoming),
    }
}

fn merge_fragment(existing: &mut SchemaFragment, incoming: SchemaFragment) {
    let Some(existing_type) = existing.schema_type else {
        *existing = incoming;
        return;
    };

    if incoming.schema_type != Some(existing_type) {
        debug!(
            "Ignoring conflicting observation: {:?} already recorded, got {:?}",
            existing_type, incoming.schema_type
        );
        return;
    }

    match existing_type {
        SchemaType::Object => {
            let properties = existing.properties.get_or_insert_with(BTreeMap::new);
            for (key, fragment) in incoming.properties.unwrap_or_default() {
                match properties.get_mut(&key) {
                    Some(known) => merge_fragment(known, fragment),
                    None => {
                        properties.insert(key, fragment);
                    }
                }
            }
        }
        SchemaType::Array => match (&mut existing.items, incoming.items) {
            (Some(known), Some(items)) => merge_fragment(known, *items),
            (None, Some(items)) => existing.items = Some(items),
            _ => {}
        },
        _ => {
            if existing.example.is_none() {
                existing.example = incoming.example;
            }
        }
    }
}
