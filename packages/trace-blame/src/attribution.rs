//! Blame attribution over a resolved frame sequence.
//!
//! Walking outward from the failure point, the first owning component found
//! is the likely culprit ("affected"); every other component or bare module
//! met afterwards is weaker evidence ("candidate"). Each module contributes at
//! most once per trace.

use std::collections::HashSet;

use indexmap::IndexSet;
use serde::Serialize;

use crate::error::ResolutionFailure;
use crate::patches::{PatchLayer, PatchMetadata};
use crate::symbols::{AttributionTarget, ComponentRef, MethodHandle, ModuleId, SymbolTable};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Attribution {
    pub affected: IndexSet<ComponentRef>,
    pub affected_candidate: IndexSet<AttributionTarget>,
    pub patch_metadata: Vec<PatchMetadata>,
}

pub struct AttributionEngine<'a> {
    symbols: &'a dyn SymbolTable,
    patches: &'a dyn PatchLayer,
}

struct Walk<'a> {
    symbols: &'a dyn SymbolTable,
    still_high_confidence: bool,
    seen_modules: HashSet<ModuleId>,
    result: Attribution,
}

impl Walk<'_> {
    fn consider(&mut self, method: &MethodHandle) {
        let module = self.symbols.module_of(method);
        // Generated methods still mark their module as seen.
        if !self.seen_modules.insert(module.clone()) || method.is_dynamic {
            return;
        }

        match self.symbols.owning_component_of(method) {
            Some(component) if self.still_high_confidence => {
                log::debug!("Attributing {method} to {} (affected)", component.id);
                self.result.affected.insert(component);
                self.still_high_confidence = false;
            }
            Some(component) => {
                self.result
                    .affected_candidate
                    .insert(AttributionTarget::Component(component));
            }
            None => {
                self.result
                    .affected_candidate
                    .insert(AttributionTarget::Module(module));
            }
        }
    }
}

impl<'a> AttributionEngine<'a> {
    pub fn new(symbols: &'a dyn SymbolTable, patches: &'a dyn PatchLayer) -> Self {
        Self { symbols, patches }
    }

    /// Attributes `resolved` in order. `trampolines` lists the targets whose
    /// patch chains should be consulted; `seeded` components were blamed by
    /// whoever reported the failure and are placed in `affected` up front.
    pub fn attribute(
        &self,
        resolved: &[MethodHandle],
        trampolines: &IndexSet<MethodHandle>,
        seeded: &[ComponentRef],
    ) -> Result<Attribution, ResolutionFailure> {
        let mut walk = Walk {
            symbols: self.symbols,
            still_high_confidence: true,
            seen_modules: HashSet::new(),
            result: Attribution::default(),
        };
        walk.result.affected.extend(seeded.iter().cloned());

        for method in resolved {
            walk.consider(method);

            if !trampolines.contains(method)
                || walk
                    .result
                    .patch_metadata
                    .iter()
                    .any(|entry| &entry.target == method)
            {
                continue;
            }

            let chain = self
                .patches
                .patch_chain_of(method)
                .map_err(|err| ResolutionFailure::collaborator(method.full_description(), &err))?;

            for (_, interceptor) in chain.interceptors() {
                walk.consider(interceptor);
            }

            walk.result.patch_metadata.push(PatchMetadata {
                target: method.clone(),
                chain,
            });
        }

        Ok(walk.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patches::{PatchChain, PatchKind};
    use crate::snapshot::{SymbolSnapshot, TypeEntry};
    use crate::symbols::ComponentKind;

    fn component(id: &str, module: &str) -> ComponentRef {
        ComponentRef::new(id, "1.0", ComponentKind::Standalone).with_module(module)
    }

    fn method(ty: &str, name: &str) -> MethodHandle {
        MethodHandle::new(ty, name, Vec::<String>::new())
    }

    fn table() -> SymbolSnapshot {
        SymbolSnapshot::default()
            .with_type(TypeEntry::new("Alpha.Main", "Alpha.dll"))
            .with_type(TypeEntry::new("Alpha.Util", "Alpha.dll"))
            .with_type(TypeEntry::new("Beta.Hooks", "Beta.dll"))
            .with_type(TypeEntry::new("Gamma.Hooks", "Gamma.dll"))
            .with_type(TypeEntry::new("Host.Engine", "Host.dll"))
            .with_component(component("Alpha", "Alpha.dll"))
            .with_component(component("Beta", "Beta.dll"))
            .with_component(component("Gamma", "Gamma.dll"))
    }

    #[test]
    fn first_component_is_affected_rest_are_candidates() {
        let table = table();
        let engine = AttributionEngine::new(&table, &table);
        let resolved = vec![
            method("Alpha.Main", "Fail"),
            method("Alpha.Util", "Help"),
            method("Host.Engine", "Tick"),
            method("Beta.Hooks", "Run"),
        ];

        let attribution = engine
            .attribute(&resolved, &IndexSet::new(), &[])
            .expect("attribution");

        let affected: Vec<_> = attribution.affected.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(affected, vec!["Alpha"]);
        assert_eq!(
            attribution.affected_candidate.iter().cloned().collect::<Vec<_>>(),
            vec![
                AttributionTarget::Module(ModuleId::new("Host.dll")),
                AttributionTarget::Component(component("Beta", "Beta.dll")),
            ]
        );
    }

    #[test]
    fn unowned_frames_do_not_end_the_high_confidence_run() {
        let table = table();
        let engine = AttributionEngine::new(&table, &table);
        let resolved = vec![method("Host.Engine", "Tick"), method("Beta.Hooks", "Run")];

        let attribution = engine
            .attribute(&resolved, &IndexSet::new(), &[])
            .expect("attribution");
        assert_eq!(attribution.affected.len(), 1);
        assert!(attribution.affected.contains(&component("Beta", "Beta.dll")));
    }

    #[test]
    fn interceptors_of_trampolines_become_candidates() {
        let target = method("Alpha.Main", "Fail");
        let chain = PatchChain::default()
            .with(PatchKind::Prefix, method("Beta.Hooks", "Before"))
            .with(PatchKind::TryPostfix, method("Gamma.Hooks", "After"))
            .with(PatchKind::Postfix, method("Alpha.Util", "Same"));
        let table = table().with_patch(target.clone(), chain.clone());
        let engine = AttributionEngine::new(&table, &table);

        let trampolines: IndexSet<_> = [target.clone()].into_iter().collect();
        let attribution = engine
            .attribute(&[target.clone(), target.clone()], &trampolines, &[])
            .expect("attribution");

        assert_eq!(attribution.affected.len(), 1);
        assert!(attribution.affected.contains(&component("Alpha", "Alpha.dll")));
        let candidates: Vec<_> = attribution.affected_candidate.iter().cloned().collect();
        assert_eq!(
            candidates,
            vec![
                AttributionTarget::Component(component("Beta", "Beta.dll")),
                AttributionTarget::Component(component("Gamma", "Gamma.dll")),
            ]
        );
        assert_eq!(
            attribution.patch_metadata,
            vec![PatchMetadata { target, chain }]
        );
    }

    #[test]
    fn seeded_components_do_not_consume_the_affected_slot() {
        let table = table();
        let engine = AttributionEngine::new(&table, &table);
        let reporter = component("Reporter", "Reporter.dll");

        let attribution = engine
            .attribute(&[method("Beta.Hooks", "Run")], &IndexSet::new(), &[reporter.clone()])
            .expect("attribution");
        let affected: Vec<_> = attribution.affected.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(affected, vec!["Reporter", "Beta"]);
    }

    #[test]
    fn dynamic_methods_are_never_blamed() {
        let table = table();
        let engine = AttributionEngine::new(&table, &table);
        let resolved = vec![
            method("Alpha.Main", "Generated").into_dynamic(),
            method("Alpha.Util", "Help"),
            method("Beta.Hooks", "Run"),
        ];

        let attribution = engine
            .attribute(&resolved, &IndexSet::new(), &[])
            .expect("attribution");
        let affected: Vec<_> = attribution.affected.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(affected, vec!["Beta"]);
        assert!(attribution.affected_candidate.is_empty());
    }

    struct FailingPatches;

    impl PatchLayer for FailingPatches {
        fn patch_chain_of(&self, _method: &MethodHandle) -> anyhow::Result<PatchChain> {
            anyhow::bail!("patch registry unavailable")
        }
    }

    #[test]
    fn patch_layer_errors_fail_the_record() {
        let table = table();
        let engine = AttributionEngine::new(&table, &FailingPatches);
        let target = method("Alpha.Main", "Fail");
        let trampolines: IndexSet<_> = [target.clone()].into_iter().collect();

        let err = engine.attribute(&[target], &trampolines, &[]).unwrap_err();
        assert!(matches!(err, ResolutionFailure::Collaborator { .. }));
    }
}
