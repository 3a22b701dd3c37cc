//! Serde-loadable, in-memory symbol table.
//!
//! Hosts export one of these as JSON so traces can be analyzed offline; tests
//! build them with the builder methods.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::disambiguate::{CONSTRUCTOR_NAME, STATIC_INITIALIZER_NAME};
use crate::patches::{PatchChain, PatchLayer, PatchMetadata};
use crate::symbols::{ComponentRef, Inventory, MethodHandle, ModuleId, SymbolTable, TypeDescriptor};

/// Module reported for methods whose declaring type is not in the snapshot.
pub const UNKNOWN_MODULE: &str = "<unknown>";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolSnapshot {
    #[serde(default)]
    pub types: Vec<TypeEntry>,
    #[serde(default)]
    pub components: Vec<ComponentRef>,
    #[serde(default)]
    pub patches: Vec<PatchMetadata>,
    /// Loaded modules that declare no listed type.
    #[serde(default)]
    pub modules: Vec<ModuleId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeEntry {
    pub name: String,
    pub module: ModuleId,
    /// Constructors are listed as `.ctor`, the static initializer as `.cctor`.
    #[serde(default)]
    pub methods: Vec<MethodSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodSpec {
    pub name: String,
    #[serde(default)]
    pub parameter_types: Vec<String>,
    #[serde(default)]
    pub is_static: bool,
}

impl TypeEntry {
    pub fn new(name: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: ModuleId::new(module),
            methods: Vec::new(),
        }
    }

    fn push<I, S>(mut self, name: &str, params: I, is_static: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods.push(MethodSpec {
            name: name.to_string(),
            parameter_types: params.into_iter().map(Into::into).collect(),
            is_static,
        });
        self
    }

    pub fn method<I, S>(self, name: &str, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(name, params, false)
    }

    pub fn static_method<I, S>(self, name: &str, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(name, params, true)
    }

    pub fn constructor<I, S>(self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(CONSTRUCTOR_NAME, params, false)
    }

    pub fn static_initializer(self) -> Self {
        self.push(STATIC_INITIALIZER_NAME, Vec::<String>::new(), true)
    }

    fn handle(&self, spec: &MethodSpec) -> MethodHandle {
        MethodHandle {
            declaring_type: self.name.clone(),
            name: spec.name.clone(),
            parameter_types: spec.parameter_types.clone(),
            is_static: spec.is_static,
            is_dynamic: false,
        }
    }

    fn handles_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = MethodHandle> + 'a {
        self.methods
            .iter()
            .filter(move |spec| spec.name == name)
            .map(move |spec| self.handle(spec))
    }
}

impl SymbolSnapshot {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("failed to parse symbol snapshot")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read symbol snapshot '{}'", path.display()))?;
        Self::from_json(&text).with_context(|| format!("in '{}'", path.display()))
    }

    pub fn with_type(mut self, entry: TypeEntry) -> Self {
        self.types.push(entry);
        self
    }

    pub fn with_component(mut self, component: ComponentRef) -> Self {
        self.components.push(component);
        self
    }

    pub fn with_patch(mut self, target: MethodHandle, chain: PatchChain) -> Self {
        self.patches.push(PatchMetadata { target, chain });
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.modules.push(ModuleId::new(module));
        self
    }

    fn entry(&self, name: &str) -> Option<&TypeEntry> {
        self.types.iter().find(|entry| entry.name == name)
    }
}

impl SymbolTable for SymbolSnapshot {
    fn resolve_type(&self, qualified_name: &str) -> Option<TypeDescriptor> {
        self.entry(qualified_name)
            .map(|entry| TypeDescriptor::new(entry.name.clone()))
    }

    fn constructors_of(&self, ty: &TypeDescriptor) -> Vec<MethodHandle> {
        self.methods_named(ty, CONSTRUCTOR_NAME)
    }

    fn static_initializer_of(&self, ty: &TypeDescriptor) -> Option<MethodHandle> {
        self.entry(&ty.full_name)?
            .handles_named(STATIC_INITIALIZER_NAME)
            .next()
    }

    fn methods_named(&self, ty: &TypeDescriptor, name: &str) -> Vec<MethodHandle> {
        self.entry(&ty.full_name)
            .map(|entry| entry.handles_named(name).collect())
            .unwrap_or_default()
    }

    fn owning_component_of(&self, method: &MethodHandle) -> Option<ComponentRef> {
        let module = self.module_of(method);
        self.components
            .iter()
            .find(|component| component.module.as_ref() == Some(&module))
            .cloned()
    }

    fn module_of(&self, method: &MethodHandle) -> ModuleId {
        self.entry(&method.declaring_type)
            .map(|entry| entry.module.clone())
            .unwrap_or_else(|| ModuleId::new(UNKNOWN_MODULE))
    }
}

impl PatchLayer for SymbolSnapshot {
    fn patch_chain_of(&self, method: &MethodHandle) -> Result<PatchChain> {
        Ok(self
            .patches
            .iter()
            .find(|patch| &patch.target == method)
            .map(|patch| patch.chain.clone())
            .unwrap_or_default())
    }
}

impl Inventory for SymbolSnapshot {
    fn installed_components(&self) -> Vec<ComponentRef> {
        self.components.clone()
    }

    fn loaded_modules(&self) -> Vec<ModuleId> {
        let modules: IndexSet<ModuleId> = self
            .types
            .iter()
            .map(|entry| entry.module.clone())
            .chain(self.modules.iter().cloned())
            .collect();
        modules.into_iter().collect()
    }
}
