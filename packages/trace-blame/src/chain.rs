//! Failure chains and the walk that turns them into resolved frames.
//!
//! Chains are owned trees (`Box`/`Vec`), so a failure can never wrap itself
//! and the recursive walk needs no cycle detection.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::disambiguate;
use crate::error::FrameError;
use crate::frame::{FrameParser, ParsedFrame, TraceFormat};
use crate::symbols::{MethodHandle, SymbolTable};

/// A caught failure as captured from the host runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub type_name: String,
    pub message: String,
    #[serde(default)]
    pub stack_trace: String,
    /// Structured frames reported by the runtime, index-aligned with the lines
    /// of `stack_trace`. `None` where the runtime could not name the method.
    #[serde(default)]
    pub frames: Vec<Option<MethodHandle>>,
    #[serde(default)]
    pub cause: Cause,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "failures", rename_all = "snake_case")]
pub enum Cause {
    #[default]
    None,
    Inner(Box<Failure>),
    /// Several failures raised concurrently and collected together.
    Aggregate(Vec<Failure>),
}

impl Failure {
    pub fn new(
        type_name: impl Into<String>,
        message: impl Into<String>,
        stack_trace: impl Into<String>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            stack_trace: stack_trace.into(),
            frames: Vec::new(),
            cause: Cause::None,
        }
    }

    pub fn with_frames(mut self, frames: Vec<Option<MethodHandle>>) -> Self {
        self.frames = frames;
        self
    }

    pub fn caused_by(mut self, inner: Failure) -> Self {
        self.cause = Cause::Inner(Box::new(inner));
        self
    }

    pub fn aggregating(mut self, inner: Vec<Failure>) -> Self {
        self.cause = Cause::Aggregate(inner);
        self
    }

    /// Follows aggregates that hold exactly one failure down to that failure.
    pub fn unwrap_singleton(&self) -> &Failure {
        let mut current = self;
        while let Cause::Aggregate(inner) = &current.cause {
            match inner.as_slice() {
                [only] => current = only,
                _ => break,
            }
        }
        current
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)?;
        match &self.cause {
            Cause::None => {}
            Cause::Inner(inner) => write!(f, " ---> {inner}")?,
            Cause::Aggregate(inner) => {
                for (index, failure) in inner.iter().enumerate() {
                    write!(f, "\n ---> (Inner Exception #{index}) {failure}")?;
                }
            }
        }
        if !self.stack_trace.is_empty() {
            write!(f, "\n{}", self.stack_trace)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum FrameOutcome {
    Resolved(MethodHandle),
    Unresolved(FrameError),
}

/// One trace line after resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedFrame {
    pub raw: String,
    /// `None` when the runtime named the method directly.
    pub parsed: Option<ParsedFrame>,
    pub outcome: FrameOutcome,
}

impl ResolvedFrame {
    pub fn direct(raw: &str, method: MethodHandle) -> Self {
        Self {
            raw: raw.to_string(),
            parsed: None,
            outcome: FrameOutcome::Resolved(method),
        }
    }

    pub fn method(&self) -> Option<&MethodHandle> {
        match &self.outcome {
            FrameOutcome::Resolved(method) => Some(method),
            FrameOutcome::Unresolved(_) => None,
        }
    }

    pub fn is_patch_trampoline(&self) -> bool {
        self.parsed
            .as_ref()
            .is_some_and(|parsed| parsed.is_patch_trampoline)
    }
}

/// Feeds trace lines through the parser and the disambiguator.
pub struct FrameWalker<'a> {
    parser: &'a FrameParser,
    symbols: &'a dyn SymbolTable,
}

impl<'a> FrameWalker<'a> {
    pub fn new(parser: &'a FrameParser, symbols: &'a dyn SymbolTable) -> Self {
        Self { parser, symbols }
    }

    /// Flattens a failure chain. Nested failures come first, then each
    /// failure's own lines in trace order.
    pub fn walk_failure(&self, failure: &Failure) -> Vec<ResolvedFrame> {
        let mut frames = Vec::new();
        self.collect(failure, &mut frames);
        frames
    }

    /// Resolves a log-callback trace, one frame per non-empty line.
    pub fn walk_log(&self, trace: &str) -> Vec<ResolvedFrame> {
        trace_lines(trace)
            .filter(|line| !line.trim().is_empty())
            .map(|line| self.resolve_line(line, TraceFormat::Log))
            .collect()
    }

    fn collect(&self, failure: &Failure, frames: &mut Vec<ResolvedFrame>) {
        let failure = failure.unwrap_singleton();

        match &failure.cause {
            Cause::None => {}
            Cause::Inner(inner) => self.collect(inner, frames),
            Cause::Aggregate(inner) => {
                for nested in inner {
                    self.collect(nested, frames);
                }
            }
        }

        if failure.frames.is_empty() {
            frames.extend(
                trace_lines(&failure.stack_trace)
                    .filter(|line| !line.trim().is_empty())
                    .map(|line| self.resolve_line(line, TraceFormat::Exception)),
            );
            return;
        }

        for (structured, line) in failure.frames.iter().zip(trace_lines(&failure.stack_trace)) {
            let frame = match structured {
                Some(method) => ResolvedFrame::direct(line, method.clone()),
                None => self.resolve_line(line, TraceFormat::Exception),
            };
            frames.push(frame);
        }
    }

    pub fn resolve_line(&self, line: &str, format: TraceFormat) -> ResolvedFrame {
        let parsed = match self.parser.parse(line, format) {
            Ok(parsed) => parsed,
            Err(err) => {
                match &err {
                    FrameError::MalformedFrameText { .. } => {
                        log::warn!("Unreadable stack frame {line:?}: {err}")
                    }
                    _ => log::warn!("{err}"),
                }
                return ResolvedFrame {
                    raw: line.to_string(),
                    parsed: None,
                    outcome: FrameOutcome::Unresolved(err),
                };
            }
        };

        let outcome = match disambiguate::resolve(&parsed, self.symbols) {
            Ok(method) => {
                log::debug!("Resolved {} to {method}", parsed.qualified_name);
                FrameOutcome::Resolved(method)
            }
            Err(err) => {
                log::warn!("{err}");
                FrameOutcome::Unresolved(err)
            }
        };

        ResolvedFrame {
            raw: line.to_string(),
            parsed: Some(parsed),
            outcome,
        }
    }
}

fn trace_lines(trace: &str) -> impl Iterator<Item = &str> {
    trace.split('\n').map(|line| line.trim_end_matches('\r'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{SymbolSnapshot, TypeEntry};

    fn symbols() -> SymbolSnapshot {
        SymbolSnapshot::default()
            .with_type(
                TypeEntry::new("Game.Outer", "Game.dll")
                    .method("Run", Vec::<String>::new()),
            )
            .with_type(
                TypeEntry::new("Game.Inner", "Game.dll")
                    .method("Step", ["System.Int32"]),
            )
    }

    fn names(frames: &[ResolvedFrame]) -> Vec<String> {
        frames
            .iter()
            .map(|frame| match &frame.outcome {
                FrameOutcome::Resolved(method) => format!("{}.{}", method.declaring_type, method.name),
                FrameOutcome::Unresolved(_) => format!("?{}", frame.raw.trim()),
            })
            .collect()
    }

    #[test]
    fn inner_failures_are_walked_first() {
        let inner = Failure::new("InvalidOperationException", "inner", "  at Game.Inner.Step (System.Int32 n) [0x0] in <x>:0");
        let outer = Failure::new("TargetInvocationException", "outer", "  at Game.Outer.Run () [0x0] in <x>:0")
            .caused_by(inner);

        let parser = FrameParser::default();
        let table = symbols();
        let frames = FrameWalker::new(&parser, &table).walk_failure(&outer);
        assert_eq!(names(&frames), vec!["Game.Inner.Step", "Game.Outer.Run"]);
    }

    #[test]
    fn singleton_aggregate_is_replaced_by_its_inner_failure() {
        let inner = Failure::new("Exception", "boom", "  at Game.Inner.Step (System.Int32 n)");
        let aggregate = Failure::new("AggregateException", "One or more errors occurred.", "  at Game.Outer.Run ()")
            .aggregating(vec![inner.clone()]);

        assert_eq!(aggregate.unwrap_singleton(), &inner);

        let parser = FrameParser::default();
        let table = symbols();
        let frames = FrameWalker::new(&parser, &table).walk_failure(&aggregate);
        assert_eq!(names(&frames), vec!["Game.Inner.Step"]);
    }

    #[test]
    fn aggregates_visit_every_inner_failure() {
        let a = Failure::new("Exception", "a", "  at Game.Inner.Step (System.Int32 n)");
        let b = Failure::new("Exception", "b", "  at Game.Missing.Call ()");
        let aggregate = Failure::new("AggregateException", "many", "  at Game.Outer.Run ()")
            .aggregating(vec![a, b]);

        let parser = FrameParser::default();
        let table = symbols();
        let frames = FrameWalker::new(&parser, &table).walk_failure(&aggregate);
        assert_eq!(
            names(&frames),
            vec!["Game.Inner.Step", "?at Game.Missing.Call ()", "Game.Outer.Run"]
        );
        assert!(matches!(
            frames[1].outcome,
            FrameOutcome::Unresolved(FrameError::TypeNotFound { .. })
        ));
    }

    #[test]
    fn structured_frames_short_circuit_parsing() {
        let direct = MethodHandle::new("Host.Engine", "Tick", Vec::<String>::new());
        let failure = Failure::new(
            "Exception",
            "boom",
            "  at Host.Engine.Tick ()\n  at Game.Outer.Run ()\n  at Extra.Line ()",
        )
        .with_frames(vec![Some(direct.clone()), None]);

        let parser = FrameParser::default();
        let table = symbols();
        let frames = FrameWalker::new(&parser, &table).walk_failure(&failure);
        // Only as many lines as there are structured frames are considered.
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].method(), Some(&direct));
        assert!(frames[0].parsed.is_none());
        assert_eq!(names(&frames)[1], "Game.Outer.Run");
    }

    #[test]
    fn log_traces_skip_blank_lines_and_keep_order() {
        let parser = FrameParser::default();
        let table = symbols();
        let trace = "Game.Inner:Step (int)\r\n\nUnityEngine.Debug:Log (object)\nGame.Outer:Run ()\n";
        let frames = FrameWalker::new(&parser, &table).walk_log(trace);
        assert_eq!(
            names(&frames),
            vec!["Game.Inner.Step", "?UnityEngine.Debug:Log (object)", "Game.Outer.Run"]
        );
        assert_eq!(frames[0].raw, "Game.Inner:Step (int)");
    }
}
