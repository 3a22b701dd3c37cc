//! Patch metadata read from the runtime patching layer.

use serde::{Deserialize, Serialize};

use crate::symbols::MethodHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchKind {
    Prefix,
    TryPrefix,
    Postfix,
    TryPostfix,
    Transpiler,
    Finalizer,
    Replace,
    Remove,
}

impl PatchKind {
    /// Order in which chains are walked and dumped.
    pub const ALL: [PatchKind; 8] = [
        PatchKind::Prefix,
        PatchKind::TryPrefix,
        PatchKind::Postfix,
        PatchKind::TryPostfix,
        PatchKind::Transpiler,
        PatchKind::Finalizer,
        PatchKind::Replace,
        PatchKind::Remove,
    ];

    pub fn heading(self) -> &'static str {
        match self {
            PatchKind::Prefix => "Prefixes",
            PatchKind::TryPrefix => "TryPrefixes",
            PatchKind::Postfix => "Postfixes",
            PatchKind::TryPostfix => "TryPostfixes",
            PatchKind::Transpiler => "Transpilers",
            PatchKind::Finalizer => "Finalizers",
            PatchKind::Replace => "Replaces",
            PatchKind::Remove => "Removes",
        }
    }

    /// Guarded (try-) interceptors cannot be removed individually.
    pub fn is_removable(self) -> bool {
        !matches!(self, PatchKind::TryPrefix | PatchKind::TryPostfix)
    }
}

/// Ordered interceptors attached to one target method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchChain {
    #[serde(default)]
    pub prefixes: Vec<MethodHandle>,
    #[serde(default)]
    pub postfixes: Vec<MethodHandle>,
    #[serde(default)]
    pub try_prefixes: Vec<MethodHandle>,
    #[serde(default)]
    pub try_postfixes: Vec<MethodHandle>,
    #[serde(default)]
    pub transpilers: Vec<MethodHandle>,
    #[serde(default)]
    pub finalizers: Vec<MethodHandle>,
    #[serde(default)]
    pub replaces: Vec<MethodHandle>,
    #[serde(default)]
    pub removes: Vec<MethodHandle>,
}

impl PatchChain {
    pub fn of_kind(&self, kind: PatchKind) -> &[MethodHandle] {
        match kind {
            PatchKind::Prefix => &self.prefixes,
            PatchKind::TryPrefix => &self.try_prefixes,
            PatchKind::Postfix => &self.postfixes,
            PatchKind::TryPostfix => &self.try_postfixes,
            PatchKind::Transpiler => &self.transpilers,
            PatchKind::Finalizer => &self.finalizers,
            PatchKind::Replace => &self.replaces,
            PatchKind::Remove => &self.removes,
        }
    }

    pub fn push(&mut self, kind: PatchKind, method: MethodHandle) {
        let list = match kind {
            PatchKind::Prefix => &mut self.prefixes,
            PatchKind::TryPrefix => &mut self.try_prefixes,
            PatchKind::Postfix => &mut self.postfixes,
            PatchKind::TryPostfix => &mut self.try_postfixes,
            PatchKind::Transpiler => &mut self.transpilers,
            PatchKind::Finalizer => &mut self.finalizers,
            PatchKind::Replace => &mut self.replaces,
            PatchKind::Remove => &mut self.removes,
        };
        list.push(method);
    }

    pub fn with(mut self, kind: PatchKind, method: MethodHandle) -> Self {
        self.push(kind, method);
        self
    }

    /// Every interceptor, grouped by kind in [`PatchKind::ALL`] order.
    pub fn interceptors(&self) -> impl Iterator<Item = (PatchKind, &MethodHandle)> + '_ {
        PatchKind::ALL
            .into_iter()
            .flat_map(move |kind| self.of_kind(kind).iter().map(move |method| (kind, method)))
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors().next().is_none()
    }
}

/// A trampoline target together with the chain installed on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchMetadata {
    pub target: MethodHandle,
    pub chain: PatchChain,
}

/// Read access to the patching layer.
pub trait PatchLayer: Send + Sync {
    fn patch_chain_of(&self, method: &MethodHandle) -> anyhow::Result<PatchChain>;
}
