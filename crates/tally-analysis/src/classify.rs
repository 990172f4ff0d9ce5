//! Deduplication and ordering of scaled findings.

use std::collections::HashMap;

use tracing::debug;

use crate::finding::{Finding, FindingCategory, Span};

/// Collapses findings with the same category and span, then orders them.
///
/// A merged finding keeps the highest severity, the distinct notes of every
/// duplicate in first-seen order, and the first safe fix. Different
/// categories on overlapping spans are kept apart. The result is ordered by
/// start offset, then severity (most severe first), then category.
#[must_use]
pub fn classify(findings: Vec<Finding>) -> Vec<Finding> {
    let before = findings.len();
    let mut index: HashMap<(FindingCategory, Span), usize> = HashMap::new();
    let mut merged: Vec<Finding> = Vec::with_capacity(findings.len());

    for finding in findings {
        match index.get(&(finding.category, finding.span)) {
            Some(&at) => absorb(&mut merged[at], finding),
            None => {
                index.insert((finding.category, finding.span), merged.len());
                merged.push(finding);
            }
        }
    }

    merged.sort();
    if merged.len() < before {
        debug!(before, after = merged.len(), "collapsed duplicate findings");
    }
    merged
}

fn absorb(kept: &mut Finding, duplicate: Finding) {
    kept.severity = kept.severity.max_with(duplicate.severity);
    for note in duplicate.notes {
        if !kept.notes.contains(&note) {
            kept.notes.push(note);
        }
    }
    let kept_safe = kept.fix.as_ref().is_some_and(|f| f.safe);
    if !kept_safe && duplicate.fix.as_ref().is_some_and(|f| f.safe) {
        kept.fix = duplicate.fix;
        kept.fixable = true;
    }
    for (key, value) in duplicate.metadata {
        kept.metadata.entry(key).or_insert(value);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
