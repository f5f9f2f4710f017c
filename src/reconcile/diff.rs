//! Keyed-list diff between an initial and an updated collection.

use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while preparing a reconciliation pass.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// Two items in the initial list share a key.
    #[error("duplicate key in reconciled list: {0}")]
    DuplicateKey(String),
}

/// Items with a natural display-name key.
pub trait Named {
    fn key(&self) -> &str;
}

/// Diff `initial` against `updated`, invoking exactly one callback per
/// affected key.
///
/// - `on_enter(new)` for keys only in `updated`
/// - `on_update(new, old)` for keys in both where `equals` is false
/// - `on_exit(old)` for keys only in `initial`, after the main pass
///
/// Keys present in both lists with `equals` true trigger nothing. The
/// updated list is walked in order; exit order is unspecified.
pub fn reconcile<'a, T>(
    initial: &'a [T],
    updated: &'a [T],
    key: impl Fn(&T) -> String,
    equals: impl Fn(&T, &T) -> bool,
    mut on_enter: impl FnMut(&'a T),
    mut on_update: impl FnMut(&'a T, &'a T),
    mut on_exit: impl FnMut(&'a T),
) -> Result<(), ReconcileError> {
    let mut lookup: HashMap<String, &'a T> = HashMap::with_capacity(initial.len());
    for item in initial {
        let k = key(item);
        if lookup.insert(k.clone(), item).is_some() {
            return Err(ReconcileError::DuplicateKey(k));
        }
    }

    for item in updated {
        match lookup.remove(&key(item)) {
            Some(old) => {
                if !equals(item, old) {
                    on_update(item, old);
                }
            }
            None => on_enter(item),
        }
    }

    for old in lookup.into_values() {
        on_exit(old);
    }

    Ok(())
}

/// [`reconcile`] with the item's display name as key and structural
/// equality as the change test.
pub fn reconcile_named<'a, T: Named + PartialEq>(
    initial: &'a [T],
    updated: &'a [T],
    on_enter: impl FnMut(&'a T),
    on_update: impl FnMut(&'a T, &'a T),
    on_exit: impl FnMut(&'a T),
) -> Result<(), ReconcileError> {
    reconcile(
        initial,
        updated,
        |item| item.key().to_string(),
        |a, b| a == b,
        on_enter,
        on_update,
        on_exit,
    )
}
