//! Resolution pipeline: walk, resolve, attribute.

use std::sync::Arc;

use indexmap::IndexSet;

use crate::attribution::AttributionEngine;
use crate::chain::{FrameOutcome, FrameWalker, ResolvedFrame};
use crate::error::ResolutionFailure;
use crate::frame::FrameParser;
use crate::patches::PatchLayer;
use crate::record::{Analysis, BugSource};
use crate::symbols::{ComponentRef, SymbolTable};

/// Holds the injected collaborators a record needs to become ready.
pub struct Engine {
    parser: FrameParser,
    symbols: Arc<dyn SymbolTable>,
    patches: Arc<dyn PatchLayer>,
}

impl Engine {
    pub fn new(
        parser: FrameParser,
        symbols: Arc<dyn SymbolTable>,
        patches: Arc<dyn PatchLayer>,
    ) -> Self {
        Self {
            parser,
            symbols,
            patches,
        }
    }

    pub fn parser(&self) -> &FrameParser {
        &self.parser
    }

    pub fn symbols(&self) -> &dyn SymbolTable {
        self.symbols.as_ref()
    }

    pub fn walker(&self) -> FrameWalker<'_> {
        FrameWalker::new(&self.parser, self.symbols.as_ref())
    }

    pub fn resolve_frames(&self, source: &BugSource) -> Vec<ResolvedFrame> {
        let walker = self.walker();
        match source {
            BugSource::Exception { failure, .. } => walker.walk_failure(failure),
            BugSource::LogLine { trace, .. } => walker.walk_log(trace),
        }
    }

    pub fn analyze(
        &self,
        source: &BugSource,
        blamed: &[ComponentRef],
    ) -> Result<Analysis, ResolutionFailure> {
        let mut analysis = Analysis::default();

        for frame in self.resolve_frames(source) {
            let is_trampoline = frame.is_patch_trampoline();
            match frame.outcome {
                FrameOutcome::Resolved(method) => {
                    if is_trampoline {
                        analysis.has_patch_method = true;
                        analysis.patch_trampoline_methods.insert(method.clone());
                    }
                    analysis.resolved_methods.push(method);
                }
                FrameOutcome::Unresolved(_) => analysis.unresolved_lines.push(frame.raw),
            }
        }

        let trampolines: &IndexSet<_> = &analysis.patch_trampoline_methods;
        let attribution = AttributionEngine::new(self.symbols.as_ref(), self.patches.as_ref())
            .attribute(&analysis.resolved_methods, trampolines, blamed)?;

        analysis.affected = attribution.affected;
        analysis.affected_candidate = attribution.affected_candidate;
        analysis.patch_metadata = attribution.patch_metadata;

        log::debug!(
            "Analyzed failure: {} resolved, {} unresolved, {} affected",
            analysis.resolved_methods.len(),
            analysis.unresolved_lines.len(),
            analysis.affected.len()
        );

        Ok(analysis)
    }
}
