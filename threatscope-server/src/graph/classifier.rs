//! Record classifier
//!
//! Pure split of a mixed record batch into per-kind groups plus the routing
//! decision. The decision lists only kinds that actually have records, in
//! canonical kind order, so downstream routing is deterministic regardless
//! of input order.

use crate::records::{Record, RecordKind};
use std::collections::BTreeMap;

/// Classification output
#[derive(Debug, Default)]
pub struct Classified {
    /// Records grouped by kind; `RecordKind`'s ordering is the canonical one,
    /// so iteration over this map is already in routing order.
    pub by_kind: BTreeMap<RecordKind, Vec<Record>>,
    /// Kinds with at least one record, canonical order
    pub decision: Vec<RecordKind>,
}

/// Split records by kind. Pure; empty input yields empty groups and an empty
/// decision.
pub fn classify(records: Vec<Record>) -> Classified {
    let mut by_kind: BTreeMap<RecordKind, Vec<Record>> = BTreeMap::new();
    for record in records {
        by_kind.entry(record.kind()).or_default().push(record);
    }

    let decision = RecordKind::CANONICAL_ORDER
        .iter()
        .copied()
        .filter(|kind| by_kind.get(kind).is_some_and(|group| !group.is_empty()))
        .collect();

    Classified { by_kind, decision }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{test_cert, test_host};

    #[test]
    fn test_classify_mixed_batch() {
        // Certs first in input; decision must still be canonical order
        let records = vec![
            Record::Cert(test_cert("c1")),
            Record::Host(test_host("10.0.0.1")),
            Record::Cert(test_cert("c2")),
        ];

        let classified = classify(records);
        assert_eq!(classified.decision, vec![RecordKind::Host, RecordKind::Cert]);
        assert_eq!(classified.by_kind[&RecordKind::Host].len(), 1);
        assert_eq!(classified.by_kind[&RecordKind::Cert].len(), 2);
    }

    #[test]
    fn test_classify_single_kind() {
        let records = vec![Record::Cert(test_cert("c1"))];
        let classified = classify(records);
        assert_eq!(classified.decision, vec![RecordKind::Cert]);
        assert!(!classified.by_kind.contains_key(&RecordKind::Host));
    }

    #[test]
    fn test_classify_empty_input() {
        let classified = classify(Vec::new());
        assert!(classified.decision.is_empty());
        assert!(classified.by_kind.is_empty());
    }
}
