#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use vesta_kernel_contracts::audit::{AuditEntry, ReconciledAuditState};

/// Result of applying one push delta.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditPushMerge {
    pub state: ReconciledAuditState,
    pub inserted: bool,
}

/// Replace the baseline with an authoritative snapshot. The snapshot is
/// deduplicated by id (first occurrence wins) and ordered newest-first.
/// `has_unseen` is preserved: only acknowledge clears it.
pub fn merge_snapshot(
    state: &ReconciledAuditState,
    snapshot: Vec<AuditEntry>,
) -> ReconciledAuditState {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut entries: Vec<AuditEntry> = snapshot
        .into_iter()
        .filter(|entry| seen.insert(entry.id.as_str().to_string()))
        .collect();
    entries.sort_by(|a, b| b.ts_ns.cmp(&a.ts_ns));
    ReconciledAuditState {
        entries,
        has_unseen: state.has_unseen,
    }
}

/// Idempotent head-insert of a pushed entry. A duplicate id is a no-op.
/// A fresh entry goes to the head even when its timestamp is not strictly
/// newer than the current head: delivery order wins for operator attention.
pub fn merge_push(state: &ReconciledAuditState, entry: AuditEntry) -> AuditPushMerge {
    if state.contains(&entry.id) {
        return AuditPushMerge {
            state: state.clone(),
            inserted: false,
        };
    }
    let mut entries = Vec::with_capacity(state.entries.len() + 1);
    entries.push(entry);
    entries.extend(state.entries.iter().cloned());
    AuditPushMerge {
        state: ReconciledAuditState {
            entries,
            has_unseen: true,
        },
        inserted: true,
    }
}

/// Clear the unseen flag. Entries are untouched.
pub fn acknowledge(state: &ReconciledAuditState) -> ReconciledAuditState {
    ReconciledAuditState {
        entries: state.entries.clone(),
        has_unseen: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vesta_kernel_contracts::audit::{AuditEntryId, AuditOutcome};

    fn entry(id: &str, ts_ns: u64) -> AuditEntry {
        AuditEntry::v1(
            AuditEntryId::new(id).unwrap(),
            ts_ns,
            "bob",
            "deleteUser",
            "carol",
            None,
            AuditOutcome::Blocked,
        )
        .unwrap()
    }

    fn ids(state: &ReconciledAuditState) -> Vec<&str> {
        state.entries.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn at_audit_merge_01_duplicate_push_is_idempotent() {
        let state = ReconciledAuditState::default();
        let first = merge_push(&state, entry("a1", 10));
        assert!(first.inserted);
        let second = merge_push(&first.state, entry("a1", 10));
        assert!(!second.inserted);
        assert_eq!(ids(&second.state), vec!["a1"]);
    }

    #[test]
    fn at_audit_merge_02_snapshot_then_pushes_is_union_newest_first() {
        let state = merge_snapshot(
            &ReconciledAuditState::default(),
            vec![entry("z0", 100), entry("z1", 50)],
        );
        let state = merge_push(&state, entry("a1", 200)).state;
        let state = merge_push(&state, entry("a2", 300)).state;
        assert_eq!(ids(&state), vec!["a2", "a1", "z0", "z1"]);
    }

    #[test]
    fn at_audit_merge_03_acknowledge_clears_only_the_flag() {
        let state = merge_push(&ReconciledAuditState::default(), entry("a1", 10)).state;
        assert!(state.has_unseen);
        let acked = acknowledge(&state);
        assert!(!acked.has_unseen);
        assert_eq!(acked.entries, state.entries);
    }

    #[test]
    fn at_audit_merge_04_snapshot_preserves_unseen_flag_both_ways() {
        let flagged = merge_push(&ReconciledAuditState::default(), entry("a1", 10)).state;
        let after = merge_snapshot(&flagged, vec![entry("a1", 10)]);
        assert!(after.has_unseen);

        let acked = acknowledge(&flagged);
        let after = merge_snapshot(&acked, vec![entry("a1", 10), entry("a2", 20)]);
        assert!(!after.has_unseen);
    }

    #[test]
    fn at_audit_merge_05_skewed_push_still_lands_at_head() {
        let state = merge_snapshot(&ReconciledAuditState::default(), vec![entry("z0", 500)]);
        let merged = merge_push(&state, entry("a1", 400));
        assert_eq!(ids(&merged.state), vec!["a1", "z0"]);
    }

    #[test]
    fn at_audit_merge_06_snapshot_dedups_and_sorts_descending() {
        let state = merge_snapshot(
            &ReconciledAuditState::default(),
            vec![entry("b", 10), entry("a", 30), entry("b", 25), entry("c", 20)],
        );
        assert_eq!(ids(&state), vec!["a", "c", "b"]);
        assert_eq!(state.entries[2].ts_ns, 10);
    }

    #[test]
    fn at_audit_merge_07_blocked_attempt_scenario() {
        let state = merge_snapshot(&ReconciledAuditState::default(), vec![entry("z0", 100)]);
        assert!(!state.has_unseen);
        let merged = merge_push(&state, entry("a1", 200));
        assert!(merged.inserted);
        assert_eq!(ids(&merged.state), vec!["a1", "z0"]);
        assert!(merged.state.has_unseen);
    }
}
