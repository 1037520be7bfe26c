//! Human-readable output for the `kglog` binary

use kglog_core::{Fact, LogIndex, ResolvedObject, ResolvedValue};
use kglog_engine::ReplayStats;

/// One line per fact: `@index fact_id subject predicate object`
pub fn format_fact(visibility_index: LogIndex, fact: &Fact) -> String {
    format!(
        "@{} {} {} {} {}",
        visibility_index,
        fact.fact_id,
        fact.subject,
        fact.predicate,
        format_object(&fact.object)
    )
}

/// Object with its annotations, if any
pub fn format_object(object: &ResolvedObject) -> String {
    let mut out = match &object.value {
        ResolvedValue::String(s) => format!("{:?}", s),
        ResolvedValue::Float(f) => format!("{}", f),
        ResolvedValue::Int(i) => format!("{}", i),
        ResolvedValue::Bool(b) => format!("{}", b),
        ResolvedValue::Kid(kid) => kid.to_string(),
        ResolvedValue::Timestamp(ts) => {
            format!("{} ({:?})", ts.truncated().to_rfc3339(), ts.precision)
        }
    };
    if let Some(unit) = object.unit {
        out.push_str(&format!(" unit={}", unit));
    }
    if let Some(lang) = object.lang {
        out.push_str(&format!(" lang={}", lang));
    }
    out
}

/// Multi-line summary of a replay
pub fn format_stats(stats: &ReplayStats) -> String {
    let rows = [
        ("entries", stats.entries_applied),
        ("commits", stats.commits),
        ("facts", stats.facts_committed),
        ("aborts", stats.aborts),
        ("rejected inserts", stats.inserts_rejected),
        ("ignored decisions", stats.decisions_ignored),
        ("wipes", stats.wipes),
        ("version moves", stats.version_moves),
        ("ignored versions", stats.versions_ignored),
        ("skipped", stats.skipped),
        ("unknown kinds", stats.unknown_kinds),
        ("decode failures", stats.decode_failures),
        ("own pings", stats.pings_matched),
    ];
    rows.iter()
        .map(|(label, n)| format!("{:<18} {}", label, n))
        .collect::<Vec<_>>()
        .join("\n")
}
