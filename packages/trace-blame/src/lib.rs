//! trace-blame: resolve stack traces against a live symbol table and work out
//! which installed component is most likely at fault.
//!
//! Text frames go through [`frame::FrameParser`] and
//! [`disambiguate::resolve`]; failure chains are flattened by
//! [`chain::FrameWalker`]; [`attribution::AttributionEngine`] turns the
//! resolved methods into affected and candidate components. [`reporter::Reporter`]
//! ties this to deduplication, a pending queue and a background worker pool.

pub mod attribution;
pub mod chain;
pub mod config;
pub mod dedup;
pub mod disambiguate;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod fixes;
pub mod frame;
pub mod logging;
pub mod patches;
pub mod queue;
pub mod record;
pub mod report;
pub mod reporter;
pub mod snapshot;
pub mod symbols;

pub use attribution::{Attribution, AttributionEngine};
pub use chain::{Cause, Failure, FrameOutcome, FrameWalker, ResolvedFrame};
pub use config::{load_config, Config, ConfigError, Labels};
pub use dedup::{DedupRegistry, Fingerprint};
pub use engine::Engine;
pub use error::{FrameError, ResolutionFailure};
pub use fixes::{fix_actions, FixAction};
pub use frame::{FrameParser, ParsedFrame, Signature, TraceFormat};
pub use patches::{PatchChain, PatchKind, PatchLayer, PatchMetadata};
pub use queue::PendingQueue;
pub use record::{Analysis, BugRecord, BugSource};
pub use reporter::{HostChannel, LogLevel, LoggingHost, Reporter};
pub use snapshot::{SymbolSnapshot, TypeEntry};
pub use symbols::{
    AttributionTarget, ComponentKind, ComponentRef, Inventory, MethodHandle, ModuleId,
    SymbolTable, TypeDescriptor,
};
