//! Bug records: one per distinct failure.

use std::fmt::Write as _;

use indexmap::IndexSet;
use once_cell::sync::{Lazy, OnceCell};
use serde::Serialize;

use crate::chain::Failure;
use crate::config::Labels;
use crate::dedup::Fingerprint;
use crate::engine::Engine;
use crate::error::ResolutionFailure;
use crate::patches::PatchMetadata;
use crate::symbols::{AttributionTarget, ComponentRef, MethodHandle};

static EMPTY_ANALYSIS: Lazy<Analysis> = Lazy::new(Analysis::default);

/// Where a record came from.
#[derive(Debug, Clone)]
pub enum BugSource {
    /// A caught failure object, optionally tagged with the reporter's key.
    Exception {
        key: Option<String>,
        failure: Failure,
    },
    /// A failure seen only as text through the host's log callback.
    LogLine { condition: String, trace: String },
}

impl BugSource {
    /// Identity used by the dedup registry for this source.
    pub fn fingerprint(&self) -> Fingerprint {
        match self {
            BugSource::Exception { failure, .. } => {
                Fingerprint::of(&failure.message, &failure.stack_trace)
            }
            BugSource::LogLine { condition, trace } => Fingerprint::of(condition, trace),
        }
    }
}

/// Output of a completed resolution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Analysis {
    pub has_patch_method: bool,
    pub affected: IndexSet<ComponentRef>,
    pub affected_candidate: IndexSet<AttributionTarget>,
    pub resolved_methods: Vec<MethodHandle>,
    pub patch_trampoline_methods: IndexSet<MethodHandle>,
    pub patch_metadata: Vec<PatchMetadata>,
    pub unresolved_lines: Vec<String>,
}

#[derive(Debug)]
pub struct BugRecord {
    source: BugSource,
    blamed: Vec<ComponentRef>,
    analysis: OnceCell<Analysis>,
}

impl BugRecord {
    pub fn from_exception(key: Option<String>, failure: Failure) -> Self {
        Self::new(BugSource::Exception { key, failure })
    }

    pub fn from_log_line(condition: impl Into<String>, trace: impl Into<String>) -> Self {
        Self::new(BugSource::LogLine {
            condition: condition.into(),
            trace: trace.into(),
        })
    }

    fn new(source: BugSource) -> Self {
        Self {
            source,
            blamed: Vec::new(),
            analysis: OnceCell::new(),
        }
    }

    /// Components the reporter already holds responsible.
    pub fn with_blamed(mut self, blamed: Vec<ComponentRef>) -> Self {
        self.blamed = blamed;
        self
    }

    pub fn source(&self) -> &BugSource {
        &self.source
    }

    pub fn blamed(&self) -> &[ComponentRef] {
        &self.blamed
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.source.fingerprint()
    }

    /// Runs resolution once; later calls return the stored result.
    ///
    /// This does the heavy lifting and is meant for worker threads; see
    /// [`crate::reporter::Reporter::ready`] for the dispatching entry point.
    pub fn ready(&self, engine: &Engine) -> Result<&Analysis, ResolutionFailure> {
        self.analysis
            .get_or_try_init(|| engine.analyze(&self.source, &self.blamed))
    }

    pub fn is_ready(&self) -> bool {
        self.analysis.get().is_some()
    }

    pub fn analysis(&self) -> Option<&Analysis> {
        self.analysis.get()
    }

    fn view(&self) -> &Analysis {
        self.analysis.get().unwrap_or(&EMPTY_ANALYSIS)
    }

    pub fn has_patch_method(&self) -> bool {
        self.view().has_patch_method
    }

    pub fn affected(&self) -> &IndexSet<ComponentRef> {
        &self.view().affected
    }

    pub fn affected_candidate(&self) -> &IndexSet<AttributionTarget> {
        &self.view().affected_candidate
    }

    pub fn resolved_methods(&self) -> &[MethodHandle] {
        &self.view().resolved_methods
    }

    pub fn patch_trampoline_methods(&self) -> &IndexSet<MethodHandle> {
        &self.view().patch_trampoline_methods
    }

    pub fn patch_metadata(&self) -> &[PatchMetadata] {
        &self.view().patch_metadata
    }

    pub fn unresolved_lines(&self) -> &[String] {
        &self.view().unresolved_lines
    }

    pub fn error_message(&self) -> String {
        match &self.source {
            BugSource::Exception { key, failure } => {
                format!("{}{}", key_prefix(key), failure.unwrap_singleton().message)
            }
            BugSource::LogLine { condition, .. } => condition.clone(),
        }
    }

    pub fn stack_trace_text(&self) -> &str {
        match &self.source {
            BugSource::Exception { failure, .. } => &failure.unwrap_singleton().stack_trace,
            BugSource::LogLine { trace, .. } => trace,
        }
    }

    pub fn full_error_text(&self) -> String {
        match &self.source {
            BugSource::Exception { key, failure } => {
                format!("{}{}", key_prefix(key), failure.unwrap_singleton())
            }
            BugSource::LogLine { condition, trace } => format!("{condition}\n{trace}"),
        }
    }

    /// Size-tagged summary for the error dialog: message, affected,
    /// candidates, then unresolved lines.
    pub fn compact_summary(&self, labels: &Labels) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            "<size=8>{}<size=4>\n\n</size><size=12>{}</size>\n",
            self.error_message(),
            labels.affected
        );
        for component in self.affected() {
            let _ = writeln!(out, "{}", AttributionTarget::Component(component.clone()));
        }

        let _ = write!(
            out,
            "<size=4>\n</size><size=12>{}</size>\n",
            labels.affected_candidate
        );
        for target in self.affected_candidate() {
            let _ = writeln!(out, "{target}");
        }
        out.pop();
        out.push_str("</size>");

        let unresolved = self.unresolved_lines();
        if !unresolved.is_empty() {
            let _ = write!(out, "\n<size=4>\n</size><size=12>{}</size>\n", labels.not_found);
            for line in unresolved {
                let _ = writeln!(out, "{line}");
            }
        }

        out
    }
}

fn key_prefix(key: &Option<String>) -> String {
    key.as_deref().map(|k| format!("{k}: ")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameParser;
    use crate::snapshot::{SymbolSnapshot, TypeEntry};
    use crate::symbols::ComponentKind;
    use std::sync::Arc;

    fn engine() -> Engine {
        let table = Arc::new(
            SymbolSnapshot::default()
                .with_type(TypeEntry::new("Mod.Feature", "Mod.dll").method("Apply", ["System.Int32"]))
                .with_component(
                    ComponentRef::new("Mod", "2.1", ComponentKind::Framework).with_module("Mod.dll"),
                ),
        );
        Engine::new(FrameParser::default(), table.clone(), table)
    }

    #[test]
    fn record_is_not_ready_until_resolved() {
        let record = BugRecord::from_log_line(
            "NullReferenceException: Object reference not set",
            "Mod.Feature:Apply (int)\nGhost.Type:Call ()",
        );
        assert!(!record.is_ready());
        assert!(record.affected().is_empty());

        let analysis = record.ready(&engine()).expect("ready");
        assert_eq!(analysis.resolved_methods.len(), 1);
        assert!(record.is_ready());
        assert_eq!(record.unresolved_lines(), ["Ghost.Type:Call ()"]);
    }

    #[test]
    fn summary_sections_are_ordered() {
        let record = BugRecord::from_log_line(
            "Boom",
            "Mod.Feature:Apply (int)\nGhost.Type:Call ()",
        );
        record.ready(&engine()).expect("ready");

        let summary = record.compact_summary(&Labels::default());
        let message = summary.find("Boom").expect("message");
        let affected = summary.find("Affected Mods").expect("affected heading");
        let component = summary.find("[Mod 2.1 (framework)]").expect("component");
        let candidates = summary.find("Affected Candidate Mods").expect("candidate heading");
        let unresolved = summary.find("Not Found Methods").expect("unresolved heading");
        let line = summary.find("Ghost.Type:Call ()").expect("unresolved line");
        assert!(message < affected && affected < component);
        assert!(component < candidates && candidates < unresolved && unresolved < line);
    }

    #[test]
    fn exception_text_uses_key_and_innermost_singleton() {
        let inner = Failure::new("InvalidOperationException", "bad state", "  at Mod.Feature.Apply (System.Int32 n)");
        let failure = Failure::new("AggregateException", "One or more errors occurred.", "")
            .aggregating(vec![inner]);
        let record = BugRecord::from_exception(Some("Loading level".into()), failure);

        assert_eq!(record.error_message(), "Loading level: bad state");
        assert_eq!(record.stack_trace_text(), "  at Mod.Feature.Apply (System.Int32 n)");
        assert!(record
            .full_error_text()
            .starts_with("Loading level: InvalidOperationException: bad state\n"));
    }

    #[test]
    fn fingerprint_matches_dedup_definition() {
        let record = BugRecord::from_log_line("Boom", "trace");
        assert_eq!(record.fingerprint(), Fingerprint::of("Boom", "trace"));

        let failure = Failure::new("Exception", "Boom", "trace");
        let record = BugRecord::from_exception(None, failure);
        assert_eq!(record.fingerprint(), Fingerprint::of("Boom", "trace"));
    }
}
