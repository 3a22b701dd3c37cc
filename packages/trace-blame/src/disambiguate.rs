//! Overload resolution for parsed frames.
//!
//! Trace text loses most overload information, so candidates are filtered
//! progressively (arity, then positional parameter types) and anything still
//! ambiguous is reported instead of guessed.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::error::FrameError;
use crate::frame::ParsedFrame;
use crate::symbols::{MethodHandle, SymbolTable};

pub const CONSTRUCTOR_NAME: &str = ".ctor";
pub const STATIC_INITIALIZER_NAME: &str = ".cctor";

static TYPE_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("bool", "System.Boolean"),
        ("byte", "System.Byte"),
        ("sbyte", "System.SByte"),
        ("char", "System.Char"),
        ("decimal", "System.Decimal"),
        ("double", "System.Double"),
        ("float", "System.Single"),
        ("int", "System.Int32"),
        ("uint", "System.UInt32"),
        ("long", "System.Int64"),
        ("ulong", "System.UInt64"),
        ("short", "System.Int16"),
        ("ushort", "System.UInt16"),
        ("object", "System.Object"),
        ("string", "System.String"),
        ("void", "System.Void"),
    ])
});

/// Splits `Ns.Type.Member` into `("Ns.Type", "Member")`.
///
/// A doubled dot keeps the dot on the member, so `Foo..ctor` yields
/// `("Foo", ".ctor")`.
pub fn split_qualified_name(qualified_name: &str) -> (&str, &str) {
    let Some(dot) = qualified_name.rfind('.') else {
        return ("", qualified_name);
    };

    if dot > 0 && qualified_name.as_bytes()[dot - 1] == b'.' {
        (&qualified_name[..dot - 1], &qualified_name[dot..])
    } else {
        (&qualified_name[..dot], &qualified_name[dot + 1..])
    }
}

/// Resolves a parsed frame to exactly one method.
pub fn resolve(frame: &ParsedFrame, symbols: &dyn SymbolTable) -> Result<MethodHandle, FrameError> {
    let (type_name, member) = split_qualified_name(&frame.qualified_name);

    let ty = symbols
        .resolve_type(type_name)
        .ok_or_else(|| FrameError::type_not_found(type_name))?;

    let mut candidates = match member {
        CONSTRUCTOR_NAME => symbols.constructors_of(&ty),
        STATIC_INITIALIZER_NAME => symbols.static_initializer_of(&ty).into_iter().collect(),
        _ => symbols.methods_named(&ty, member),
    };

    if candidates.is_empty() {
        return Err(FrameError::method_not_found(&frame.qualified_name));
    }

    if candidates.len() == 1 {
        return Ok(candidates.remove(0));
    }

    candidates = narrow_by_arity(candidates, frame);
    if candidates.len() > 1 {
        candidates = narrow_by_position(candidates, frame);
    }

    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        0 => Err(FrameError::method_not_found(&frame.qualified_name)),
        n => Err(FrameError::ambiguous(&frame.qualified_name, n)),
    }
}

/// Whether `candidate` needs an extra slot for its receiver when matching
/// arity. Only generated wrappers pass the instance explicitly.
fn has_receiver_slot(frame: &ParsedFrame, candidate: &MethodHandle) -> bool {
    frame.is_dynamic_wrapper && !candidate.is_static
}

/// Whether slot 0 of the observed signature names the receiver of
/// `candidate` rather than its first parameter.
fn shifts_for_receiver(frame: &ParsedFrame, candidate: &MethodHandle, observed: usize) -> bool {
    if has_receiver_slot(frame, candidate) {
        return true;
    }
    frame.is_patch_trampoline && !candidate.is_static && observed == candidate.arity() + 1
}

/// Keeps candidates whose (receiver-adjusted) arity matches the frame.
///
/// A frame without any parameter information keeps every candidate.
pub fn narrow_by_arity(candidates: Vec<MethodHandle>, frame: &ParsedFrame) -> Vec<MethodHandle> {
    let Some(observed) = frame.signature.len() else {
        return candidates;
    };

    candidates
        .into_iter()
        .filter(|candidate| {
            let receiver = usize::from(has_receiver_slot(frame, candidate));
            candidate.arity() + receiver == observed
        })
        .collect()
}

/// Drops candidates whose parameter types disagree with the frame's type
/// tokens, position by position, stopping once at most one is left.
pub fn narrow_by_position(
    mut candidates: Vec<MethodHandle>,
    frame: &ParsedFrame,
) -> Vec<MethodHandle> {
    let Some(tokens) = frame.signature.type_tokens() else {
        return candidates;
    };
    let observed = tokens.len();

    for (index, token) in tokens.iter().enumerate() {
        candidates.retain(|candidate| {
            let formal = if shifts_for_receiver(frame, candidate, observed) {
                match index {
                    0 => Some(candidate.declaring_type.as_str()),
                    _ => candidate.parameter_types.get(index - 1).map(String::as_str),
                }
            } else {
                candidate.parameter_types.get(index).map(String::as_str)
            };
            formal.is_some_and(|formal| type_names_agree(token, formal))
        });

        if candidates.len() <= 1 {
            break;
        }
    }

    candidates
}

/// Compares a type token printed in a trace with a formal parameter type.
pub fn type_names_agree(observed: &str, formal: &str) -> bool {
    if observed == formal {
        return true;
    }
    if formal.rsplit('.').next() == Some(observed) {
        return true;
    }
    TYPE_ALIASES.get(observed).is_some_and(|full| *full == formal)
}
