//! Differential schema validation.
//!
//! Every XML part governed by a bundled rule set is checked, and so is the
//! same part of a baseline package, usually the package as it was loaded.
//! Only violations the baseline does not have are reported, so deviations
//! already present in source material never block an edit. Before checking,
//! padded text runs are repaired in place; that repair is the only mutation.

pub mod repair;
pub mod rules;

pub use rules::{AttributeRule, AttributeType, ElementRule, RuleSet, SCHEMA_SET, SchemaSet, Violation};

use crate::common::xml::condense;
use crate::ooxml::opc::package::Package;
use crate::ooxml::validate::{CheckKind, Finding, Location};
use rayon::prelude::*;
use std::collections::HashSet;

/// Repair padded text runs in `package`, then report the schema violations
/// that `baseline` does not already have.
///
/// Repairs come first in the result, then errors, each in part name order.
pub fn validate_schema(package: &mut Package, baseline: &Package) -> Vec<Finding> {
    let mut findings = repair_whitespace(package);
    let repaired = findings.len();

    let package: &Package = package;
    let names: Vec<&str> = package
        .part_names()
        .into_iter()
        .filter(|name| SCHEMA_SET.for_member(name).is_some())
        .collect();
    let regressions = names
        .par_iter()
        .map(|name| regressions_in(package, baseline, name))
        .collect::<Vec<_>>()
        .concat();

    tracing::info!(
        parts = names.len(),
        repaired,
        regressions = regressions.len(),
        "schema validation finished"
    );
    findings.extend(regressions);
    findings
}

fn repair_whitespace(package: &mut Package) -> Vec<Finding> {
    let repaired: Vec<_> = package
        .part_names()
        .into_par_iter()
        .filter_map(|name| {
            let part = package.part(name)?;
            let (text, paths) = repair::preserve_whitespace(part.xml_str().ok()?)?;
            Some((part.partname().clone(), text, paths))
        })
        .collect();

    let mut findings = Vec::new();
    for (partname, text, paths) in repaired {
        tracing::debug!(part = %partname, repairs = paths.len(), "preserved padded text");
        package.put_xml(&partname, text);
        findings.extend(paths.into_iter().map(|path| {
            Finding::repaired(
                CheckKind::Schema,
                Location::element(partname.membername(), path),
                "added xml:space=\"preserve\" to padded text",
            )
        }));
    }
    findings
}

fn regressions_in(package: &Package, baseline: &Package, name: &str) -> Vec<Finding> {
    let (Some(rules), Ok(xml)) = (SCHEMA_SET.for_member(name), package.xml(name)) else {
        return Vec::new();
    };
    let current = rules.check(xml);
    if current.is_empty() {
        return Vec::new();
    }

    let known_violations = baseline
        .xml(name)
        .map(|xml| rules.check(xml))
        .unwrap_or_default();
    let known: HashSet<_> = known_violations.iter().map(Violation::key).collect();

    current
        .into_iter()
        .filter(|violation| !known.contains(&violation.key()))
        .map(|violation| {
            tracing::warn!(
                part = name,
                rule = violation.rule,
                path = %violation.path,
                "schema regression"
            );
            to_finding(name, violation)
        })
        .collect()
}

fn to_finding(member: &str, violation: Violation) -> Finding {
    Finding::error(
        CheckKind::Schema,
        Location::element(member, violation.path),
        format!("{} ({})", violation.message, violation.rule),
    )
}

/// Check one candidate part before it is written into a package.
///
/// `member` selects the rule set and may carry a leading slash. There is no
/// baseline, so every violation is reported. Malformed XML yields a single
/// well-formedness finding; a member no rule set governs is only checked
/// for well-formedness.
pub fn validate_part_xml(member: &str, xml: &str) -> Vec<Finding> {
    let member = member.trim_start_matches('/');
    if let Err(e) = condense(xml) {
        return vec![Finding::error(
            CheckKind::WellFormed,
            Location::part(member),
            e.to_string(),
        )];
    }
    let Some(rules) = SCHEMA_SET.for_member(member) else {
        return Vec::new();
    };
    rules
        .check(xml)
        .into_iter()
        .map(|violation| to_finding(member, violation))
        .collect()
}
