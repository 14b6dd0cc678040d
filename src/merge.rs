//! Snapshot merging.

use crate::types::{Document, Snapshot};
use std::collections::BTreeSet;

/// Folds deletions and upserts into `prior`, producing the next snapshot.
///
/// Deletions are applied first, then upserts in order, so a document both
/// removed and written in the same window ends up present. An upserted
/// tombstone removes its key instead of being stored.
///
/// # Arguments
///
/// * `prior` - Snapshot of the previous cycle
/// * `deleted` - Identifiers removed since the previous cycle
/// * `upserted` - Documents created or updated since the previous cycle
///
/// # Returns
///
/// The merged snapshot, which never holds tombstones.
pub fn merge(prior: &Snapshot, deleted: &BTreeSet<String>, upserted: &[Document]) -> Snapshot {
    let mut merged = prior.clone();

    for identifier in deleted {
        merged.remove(identifier);
    }

    for document in upserted {
        if document.is_tombstone() {
            merged.remove(&document.identifier);
        } else {
            merged.insert(document.identifier.clone(), document.clone());
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldValue, Payload};
    use serde_json::json;

    fn doc(id: &str, ts: i64) -> Document {
        let mut payload = Payload::new();
        payload.insert("n".into(), FieldValue::Scalar(json!(ts)));
        Document::new(id, ts, payload)
    }

    fn snapshot(docs: &[Document]) -> Snapshot {
        docs.iter()
            .map(|d| (d.identifier.clone(), d.clone()))
            .collect()
    }

    fn keys(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_merge_is_identity() {
        let s = snapshot(&[doc("a", 1), doc("b", 2)]);
        assert_eq!(merge(&s, &BTreeSet::new(), &[]), s);
    }

    #[test]
    fn delete_removes_only_present_keys() {
        let s = snapshot(&[doc("a", 1), doc("b", 2)]);

        let removed = merge(&s, &keys(&["a"]), &[]);
        assert_eq!(removed, snapshot(&[doc("b", 2)]));

        let untouched = merge(&s, &keys(&["zzz"]), &[]);
        assert_eq!(untouched, s);
    }

    #[test]
    fn delete_then_upsert_equals_upsert() {
        let s = snapshot(&[doc("a", 1), doc("k", 2)]);
        let upsert = [doc("k", 5)];

        let resurrected = merge(&s, &keys(&["k"]), &upsert);
        assert_eq!(resurrected, merge(&s, &BTreeSet::new(), &upsert));
        assert_eq!(resurrected["k"].timestamp, 5);
    }

    #[test]
    fn later_upsert_wins_by_order_not_timestamp() {
        let s = Snapshot::new();
        let merged = merge(&s, &BTreeSet::new(), &[doc("a", 9), doc("a", 3)]);
        assert_eq!(merged["a"].timestamp, 3);
    }

    #[test]
    fn upserted_tombstone_is_never_stored() {
        let s = snapshot(&[doc("a", 1)]);
        let merged = merge(
            &s,
            &BTreeSet::new(),
            &[Document::tombstone("a", 4), Document::tombstone("new", 4)],
        );
        assert!(merged.is_empty());
    }

    #[test]
    fn repeated_merge_with_same_inputs_is_stable() {
        let s = snapshot(&[doc("a", 1), doc("b", 2)]);
        let deleted = keys(&["b"]);
        let upserted = [doc("c", 3)];
        assert_eq!(
            merge(&s, &deleted, &upserted),
            merge(&s, &deleted, &upserted)
        );
    }
}
