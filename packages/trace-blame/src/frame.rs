//! Lexing of raw stack-trace lines into [`ParsedFrame`]s.
//!
//! Two trace layouts are understood:
//!
//! - [`TraceFormat::Exception`]: lines produced by a caught failure object,
//!   e.g. `at Foo.Bar (System.Int32 x) [0x00012] in <abc>:0`, or for
//!   generated code `at (wrapper dynamic-method) Ns.Foo.Bar_Patch1(Foo,int)`.
//! - [`TraceFormat::Log`]: lines from the host's log callback, which separate
//!   type and member with `:` and end with a location group,
//!   e.g. `Foo:Bar (int) (at Assets/Foo.cs:12)`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{Config, ConfigError, DEFAULT_GENERATOR_NAMESPACE, DEFAULT_WRAPPER_MARKER};
use crate::error::FrameError;

static DEFAULT_TRAMPOLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_Patch\d+$").expect("default trampoline pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceFormat {
    Exception,
    Log,
}

/// What the trace tells us about a frame's parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Signature {
    /// One type name per parameter.
    Types(Vec<String>),
    /// Parameter slots are present but their types are not printed.
    Arity(usize),
    /// The line carried no parameter list at all.
    Unknown,
}

impl Signature {
    pub fn len(&self) -> Option<usize> {
        match self {
            Signature::Types(types) => Some(types.len()),
            Signature::Arity(n) => Some(*n),
            Signature::Unknown => None,
        }
    }

    pub fn type_tokens(&self) -> Option<&[String]> {
        match self {
            Signature::Types(types) => Some(types),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedFrame {
    /// Dotted `Type.Member` path. For trampolines this is the original
    /// method's name with the generated suffix removed.
    pub qualified_name: String,
    pub is_synthetic: bool,
    pub is_dynamic_wrapper: bool,
    pub is_patch_trampoline: bool,
    pub signature: Signature,
}

#[derive(Debug, Clone)]
pub struct FrameParser {
    wrapper_marker: String,
    generator_namespace: String,
    trampoline: Regex,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self {
            wrapper_marker: DEFAULT_WRAPPER_MARKER.to_string(),
            generator_namespace: DEFAULT_GENERATOR_NAMESPACE.to_string(),
            trampoline: DEFAULT_TRAMPOLINE.clone(),
        }
    }
}

impl FrameParser {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let pattern = format!(r"{}\d+$", regex::escape(&config.trampoline_suffix));
        let trampoline = Regex::new(&pattern).map_err(|source| ConfigError::InvalidSuffix {
            suffix: config.trampoline_suffix.clone(),
            source,
        })?;

        Ok(Self {
            wrapper_marker: config.wrapper_marker.clone(),
            generator_namespace: config.generator_namespace.clone(),
            trampoline,
        })
    }

    pub fn parse(&self, line: &str, format: TraceFormat) -> Result<ParsedFrame, FrameError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(FrameError::malformed(line, "empty line"));
        }

        let mut rest = strip_word(trimmed, "at").unwrap_or(trimmed);

        let is_dynamic_wrapper = match rest.strip_prefix(self.wrapper_marker.as_str()) {
            Some(after) if !self.wrapper_marker.is_empty() => {
                rest = after.trim_start();
                true
            }
            _ => false,
        };

        let name_end = rest
            .find(|c: char| c == '(' || c.is_whitespace())
            .unwrap_or(rest.len());
        let raw_name = &rest[..name_end];
        if raw_name.is_empty() {
            return Err(FrameError::malformed(line, "missing member name"));
        }

        let after_name = rest[name_end..].trim_start();
        let params = match leading_group(after_name) {
            Ok(Some(inner)) if format == TraceFormat::Log && is_location(inner) => None,
            Ok(group) => group,
            Err(reason) => return Err(FrameError::malformed(line, reason)),
        };

        let mut qualified_name = match format {
            TraceFormat::Log => raw_name.replace(':', "."),
            TraceFormat::Exception => raw_name.to_string(),
        };

        if is_dynamic_wrapper && !self.generator_namespace.is_empty() {
            if let Some(stripped) = qualified_name.strip_prefix(self.generator_namespace.as_str()) {
                qualified_name = stripped.to_string();
            }
        }

        let is_patch_trampoline = match self.trampoline.find(&qualified_name) {
            Some(found) => {
                qualified_name.truncate(found.start());
                true
            }
            None => false,
        };

        if qualified_name.is_empty() {
            return Err(FrameError::malformed(line, "member name is only a suffix"));
        }

        if is_dynamic_wrapper && !is_patch_trampoline {
            return Err(FrameError::unsupported_dynamic(qualified_name));
        }

        let signature = params.map_or(Signature::Unknown, parse_signature);

        Ok(ParsedFrame {
            qualified_name,
            is_synthetic: is_dynamic_wrapper || is_patch_trampoline,
            is_dynamic_wrapper,
            is_patch_trampoline,
            signature,
        })
    }
}

/// Strips a leading keyword followed by whitespace.
fn strip_word<'a>(text: &'a str, word: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(word)?;
    if rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

/// Returns the contents of a balanced `( ... )` group at the start of `text`.
fn leading_group(text: &str) -> Result<Option<&str>, &'static str> {
    if !text.starts_with('(') {
        return Ok(None);
    }

    let mut depth = 0usize;
    for (idx, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(Some(&text[1..idx]));
                }
            }
            _ => {}
        }
    }

    Err("unbalanced parentheses")
}

fn is_location(group: &str) -> bool {
    strip_word(group.trim_start(), "at").is_some()
}

fn parse_signature(inner: &str) -> Signature {
    let inner = inner.trim();
    if inner.is_empty() {
        return Signature::Types(Vec::new());
    }

    let tokens: Vec<String> = split_top_level(inner)
        .into_iter()
        .map(|param| param.split_whitespace().next().unwrap_or("").to_string())
        .collect();

    if tokens.iter().all(String::is_empty) {
        Signature::Arity(tokens.len())
    } else {
        Signature::Types(tokens)
    }
}

/// Splits on commas that are not nested inside generic brackets.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;

    for (idx, ch) in text.char_indices() {
        match ch {
            '[' | '<' | '(' => depth += 1,
            ']' | '>' | ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&text[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}
