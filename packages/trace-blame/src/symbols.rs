//! Read-only view of the host's live type system.
//!
//! The engine never builds these values itself; a [`SymbolTable`] is injected
//! by the host (or by [`crate::snapshot::SymbolSnapshot`] in tests and the CLI).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lowest-level compiled unit a method belongs to (an assembly or library).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(name: impl Into<String>) -> Self {
        ModuleId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub full_name: String,
}

impl TypeDescriptor {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
        }
    }
}

/// A resolved method (or constructor) as reported by the symbol table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodHandle {
    pub declaring_type: String,
    pub name: String,
    #[serde(default)]
    pub parameter_types: Vec<String>,
    #[serde(default)]
    pub is_static: bool,
    /// Generated at runtime; such methods have no owning component.
    #[serde(default)]
    pub is_dynamic: bool,
}

impl MethodHandle {
    pub fn new<I, S>(declaring_type: impl Into<String>, name: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            parameter_types: params.into_iter().map(Into::into).collect(),
            is_static: false,
            is_dynamic: false,
        }
    }

    pub fn into_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn into_dynamic(mut self) -> Self {
        self.is_dynamic = true;
        self
    }

    pub fn arity(&self) -> usize {
        self.parameter_types.len()
    }

    /// `static Foo::Bar(System.Int32)` style description used in reports.
    pub fn full_description(&self) -> String {
        let prefix = if self.is_static { "static " } else { "" };
        format!(
            "{prefix}{}::{}({})",
            self.declaring_type,
            self.name,
            self.parameter_types.join(", ")
        )
    }
}

impl fmt::Display for MethodHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_description())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// Built on the host's shared mod framework.
    Framework,
    /// Registered with the mod loader only.
    Standalone,
}

/// A loadable unit of third-party code that can be blamed for a failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentRef {
    pub id: String,
    pub version: String,
    /// Version declared in the component's manifest, when it differs from the
    /// loaded one.
    #[serde(default)]
    pub declared_version: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    pub kind: ComponentKind,
    #[serde(default)]
    pub module: Option<ModuleId>,
}

impl ComponentRef {
    pub fn new(id: impl Into<String>, version: impl Into<String>, kind: ComponentKind) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            declared_version: None,
            display_name: None,
            kind,
            module: None,
        }
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(ModuleId::new(module));
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn declared_version(&self) -> &str {
        self.declared_version.as_deref().unwrap_or(&self.version)
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }

    pub fn module_name(&self) -> &str {
        self.module.as_ref().map_or("Not Loaded", ModuleId::as_str)
    }
}

/// Something blame can be pinned on: a known component, or a bare module
/// when no component claims it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttributionTarget {
    Component(ComponentRef),
    Module(ModuleId),
}

impl fmt::Display for AttributionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributionTarget::Component(component) => {
                write!(f, "[{} {}", component.id, component.version)?;
                if component.kind == ComponentKind::Framework {
                    f.write_str(" (framework)")?;
                }
                f.write_str("]")
            }
            AttributionTarget::Module(module) => write!(f, "[{module}]"),
        }
    }
}

/// Live type lookup provided by the host runtime.
///
/// Implementations must be safe to query from worker threads; the engine
/// treats them as read-only.
pub trait SymbolTable: Send + Sync {
    fn resolve_type(&self, qualified_name: &str) -> Option<TypeDescriptor>;

    fn constructors_of(&self, ty: &TypeDescriptor) -> Vec<MethodHandle>;

    fn static_initializer_of(&self, ty: &TypeDescriptor) -> Option<MethodHandle>;

    /// Methods declared on `ty` whose name matches `name` exactly.
    fn methods_named(&self, ty: &TypeDescriptor, name: &str) -> Vec<MethodHandle>;

    fn owning_component_of(&self, method: &MethodHandle) -> Option<ComponentRef>;

    fn module_of(&self, method: &MethodHandle) -> ModuleId;
}

/// Everything installed in the host, listed at the end of saved reports.
pub trait Inventory: Send + Sync {
    fn installed_components(&self) -> Vec<ComponentRef>;

    fn loaded_modules(&self) -> Vec<ModuleId>;
}
