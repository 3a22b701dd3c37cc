//! Remedies the presentation layer can offer for a ready record.

use std::fmt;

use serde::Serialize;

use crate::record::Analysis;
use crate::symbols::{ComponentRef, MethodHandle};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FixAction {
    /// Turn the component off so it is not loaded next time.
    DisableComponent(ComponentRef),
    /// Detach one interceptor from a patched method.
    Unpatch {
        target: MethodHandle,
        interceptor: MethodHandle,
    },
}

impl fmt::Display for FixAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixAction::DisableComponent(component) => write!(f, "Disable {}", component.id),
            FixAction::Unpatch {
                target,
                interceptor,
            } => write!(
                f,
                "Unpatch {}.{} from {}",
                interceptor.declaring_type, interceptor.name, target.name
            ),
        }
    }
}

/// Disable actions for every affected component, followed by unpatch actions
/// for each removable interceptor in recorded patch chains.
pub fn fix_actions(analysis: &Analysis) -> Vec<FixAction> {
    let mut actions: Vec<FixAction> = analysis
        .affected
        .iter()
        .cloned()
        .map(FixAction::DisableComponent)
        .collect();

    for entry in &analysis.patch_metadata {
        for (kind, interceptor) in entry.chain.interceptors() {
            if !kind.is_removable() {
                continue;
            }
            actions.push(FixAction::Unpatch {
                target: entry.target.clone(),
                interceptor: interceptor.clone(),
            });
        }
    }

    actions
}
