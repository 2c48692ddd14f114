//! Deduplicator: find a historical snapshot equal to the candidate.

use vellum_storage::SnapshotRecord;

use crate::attributes::{field, loose_eq, Attributes};
use crate::builder::decode_payload;
use crate::error::VersioningError;

/// Return the first snapshot in `history` whose versionable fields are all
/// loosely equal to `candidate`'s.
///
/// `history` is scanned in the order given; the engine passes it oldest
/// first so the earliest matching snapshot wins. Fields outside
/// `versionable` never take part. With no versionable fields nothing can
/// match, so every commit inserts a new snapshot.
pub fn find_match<'a>(
    candidate: &Attributes,
    history: &'a [SnapshotRecord],
    versionable: &[String],
) -> Result<Option<&'a SnapshotRecord>, VersioningError> {
    if versionable.is_empty() {
        return Ok(None);
    }
    for existing in history {
        let stored = decode_payload(&existing.payload)?;
        let equal = versionable
            .iter()
            .filter(|name| loose_eq(field(candidate, name), field(&stored, name)))
            .count();
        if equal == versionable.len() && equal > 0 {
            return Ok(Some(existing));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use time::OffsetDateTime;
    use vellum_storage::{OwnerRef, SnapshotId};

    fn attrs(value: Value) -> Attributes {
        serde_json::from_value(value).unwrap()
    }

    fn record(id: i64, payload: Value) -> SnapshotRecord {
        SnapshotRecord {
            id: SnapshotId(id),
            owner: OwnerRef::new("article", "1"),
            schema: "version".to_string(),
            actor_id: None,
            active: false,
            payload: payload.to_string(),
            reason: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn matching_tracked_fields_reactivate() {
        let history = vec![record(1, json!({"x": 1})), record(2, json!({"x": 2}))];
        let found = find_match(&attrs(json!({"x": 1})), &history, &fields(&["x"])).unwrap();
        assert_eq!(found.map(|r| r.id), Some(SnapshotId(1)));
    }

    #[test]
    fn untracked_differences_are_ignored() {
        let history = vec![record(1, json!({"x": 1, "note": "old"}))];
        let found = find_match(
            &attrs(json!({"x": 1, "note": "new"})),
            &history,
            &fields(&["x"]),
        )
        .unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn first_match_wins() {
        let history = vec![
            record(1, json!({"x": 1})),
            record(2, json!({"x": 2})),
            record(3, json!({"x": 1})),
        ];
        let found = find_match(&attrs(json!({"x": 1})), &history, &fields(&["x"])).unwrap();
        assert_eq!(found.map(|r| r.id), Some(SnapshotId(1)));
    }

    #[test]
    fn loose_equality_applies() {
        let history = vec![record(1, json!({"x": "1"}))];
        let found = find_match(&attrs(json!({"x": 1})), &history, &fields(&["x"])).unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn partial_match_is_no_match() {
        let history = vec![record(1, json!({"x": 1, "y": 1}))];
        let found = find_match(
            &attrs(json!({"x": 1, "y": 2})),
            &history,
            &fields(&["x", "y"]),
        )
        .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn no_versionable_fields_never_match() {
        let history = vec![record(1, json!({"x": 1}))];
        let found = find_match(&attrs(json!({"x": 1})), &history, &[]).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn missing_field_matches_null() {
        let history = vec![record(1, json!({"x": 1}))];
        let found = find_match(
            &attrs(json!({"x": 1, "y": null})),
            &history,
            &fields(&["x", "y"]),
        )
        .unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn corrupt_payload_is_an_error() {
        let mut bad = record(1, json!({}));
        bad.payload = "not json".to_string();
        let history = [bad];
        let result = find_match(&attrs(json!({"x": 1})), &history, &fields(&["x"]));
        assert!(matches!(result, Err(VersioningError::Payload(_))));
    }
}
