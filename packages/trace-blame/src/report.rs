//! Plain-text bug report export.
//!
//! Section order and headings are fixed so saved reports stay comparable with
//! ones produced by earlier releases.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone};

use crate::patches::PatchKind;
use crate::record::BugRecord;
use crate::symbols::{AttributionTarget, ComponentKind, ComponentRef, Inventory};

const AFFECTED_HEADER: &str = "=====Affected Mods/문제일 가능성이 높은 모드=====\n";
const CANDIDATE_HEADER: &str = "=====Affected Candidates/문제일 가능성이 있는 후보 모드=====\n";
const NOT_FOUND_HEADER: &str = "=====Not Found Methods/분석할 수 없는 메서드=====\n";
const PATCHED_HEADER: &str = "=====Patched Methods/패치된 메서드=====\n";
const PATCH_DATA_HEADER: &str = "=====Patch Data/패치 데이터=====\n";
const ALL_COMPONENTS_HEADER: &str = "=====All Mods/모든 모드=====\n";
const ALL_MODULES_HEADER: &str = "=====All Assembly/모든 어셈블리=====\n";

/// `BugReport-2024-05-01-13-37-00.log` for the default prefix.
pub fn default_file_name<Tz: TimeZone>(prefix: &str, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{prefix}{}.log", now.format("%Y-%m-%d-%H-%M-%S"))
}

/// Renders the full report for a ready record.
pub fn render_report(record: &BugRecord, inventory: &dyn Inventory) -> String {
    let mut out = String::new();
    out.push_str(&record.full_error_text());
    out.push_str("\n\n");

    out.push_str(AFFECTED_HEADER);
    for component in record.affected() {
        let _ = writeln!(out, "{}", affected_entry(component));
    }
    out.push('\n');

    out.push_str(CANDIDATE_HEADER);
    for target in record.affected_candidate() {
        let line = match target {
            AttributionTarget::Component(component) => listed_entry(component),
            AttributionTarget::Module(module) => format!("[{module}]"),
        };
        let _ = writeln!(out, "{line}");
    }
    out.push('\n');

    let unresolved = record.unresolved_lines();
    if !unresolved.is_empty() {
        out.push_str(NOT_FOUND_HEADER);
        for line in unresolved {
            let _ = write!(out, "{line}\n\n");
        }
    }

    let patched = record.patch_trampoline_methods();
    if !patched.is_empty() {
        out.push_str(PATCHED_HEADER);
        for method in patched {
            let _ = writeln!(out, "{}", method.full_description());
        }
        out.push('\n');
    }

    let metadata = record.patch_metadata();
    if !metadata.is_empty() {
        out.push_str(PATCH_DATA_HEADER);
        for entry in metadata {
            let _ = writeln!(out, "[{}]", entry.target.full_description());
            for kind in PatchKind::ALL {
                let methods = entry.chain.of_kind(kind);
                if methods.is_empty() {
                    continue;
                }
                let _ = writeln!(out, "--{}--", kind.heading());
                for method in methods {
                    let _ = writeln!(out, "{}", method.full_description());
                }
                out.push('\n');
            }
        }
        out.push('\n');
    }

    out.push_str(ALL_COMPONENTS_HEADER);
    for component in inventory.installed_components() {
        let _ = writeln!(out, "{}", listed_entry(&component));
    }
    out.push('\n');

    out.push_str(ALL_MODULES_HEADER);
    for module in inventory.loaded_modules() {
        let _ = writeln!(out, "[{module}]");
    }
    out.pop();

    out
}

pub fn save_report(record: &BugRecord, inventory: &dyn Inventory, path: &Path) -> Result<()> {
    fs::write(path, render_report(record, inventory))
        .with_context(|| format!("Failed to write bug report to {}", path.display()))?;
    log::info!("Saved bug report to {}", path.display());
    Ok(())
}

fn affected_entry(component: &ComponentRef) -> String {
    match component.kind {
        ComponentKind::Framework => framework_entry(component),
        ComponentKind::Standalone => format!(
            "[Mod Name: {}, Version: {}, DisplayName: {}, Assembly: {}]",
            component.id,
            component.declared_version(),
            component.display_name(),
            component.module_name()
        ),
    }
}

fn listed_entry(component: &ComponentRef) -> String {
    match component.kind {
        ComponentKind::Framework => framework_entry(component),
        ComponentKind::Standalone => format!(
            "[Mod Name: {}, Version: {}({}), DisplayName: {}, Assembly: {}]",
            component.id,
            component.version,
            component.declared_version(),
            component.display_name(),
            component.module_name()
        ),
    }
}

fn framework_entry(component: &ComponentRef) -> String {
    format!(
        "[JAMod Name: {}, Version: {}, Assembly: {}]",
        component.id,
        component.version,
        component.module_name()
    )
}
