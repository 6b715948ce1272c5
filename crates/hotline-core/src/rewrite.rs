//! Boundary-safe identifier rewriting.
//!
//! Before re-submitting edited source, callers rename identifiers that were
//! replaced in earlier cycles. This is a conservative textual substitution,
//! not a tokenizer: an occurrence matches only when bounded by a leading
//! space and a trailing space, `(`, or `:`.
//!
//! Known limitations, kept deliberately (widening the rule changes which
//! identifiers match): occurrences at line start/end and boundaries formed
//! by commas, tabs, or generic brackets are not rewritten.

use std::collections::BTreeMap;

/// Rewrite identifiers in `source` per `renames` (old name -> new name).
///
/// No-op entries (old == new) are skipped. Entries are applied in key order,
/// so the output is deterministic even when renames overlap.
pub fn rewrite(source: &str, renames: &BTreeMap<String, String>) -> String {
    let mut code = source.to_string();
    for (old, new) in renames {
        if old == new {
            continue;
        }
        code = code.replace(&format!(" {old} "), &format!(" {new} "));
        code = code.replace(&format!(" {old}("), &format!(" {new}("));
        code = code.replace(&format!(" {old}:"), &format!(" {new}:"));
    }
    code
}
