//! Snapshot builder and payload codec.

use time::OffsetDateTime;
use vellum_storage::{NewSnapshot, OwnerRef};

use crate::attributes::Attributes;
use crate::error::VersioningError;

/// Serialize a full attribute map into an opaque snapshot payload.
pub fn encode_payload(attributes: &Attributes) -> Result<String, serde_json::Error> {
    serde_json::to_string(attributes)
}

/// Decode a payload written by [`encode_payload`].
pub fn decode_payload(payload: &str) -> Result<Attributes, serde_json::Error> {
    serde_json::from_str(payload)
}

/// Build the candidate snapshot for a version-worthy commit.
///
/// The pending reason is moved out of `reason`, leaving it empty for the
/// next cycle.
pub fn build_candidate(
    owner: &OwnerRef,
    schema: &str,
    attributes: &Attributes,
    actor_id: Option<String>,
    reason: &mut Option<String>,
    now: OffsetDateTime,
) -> Result<NewSnapshot, VersioningError> {
    Ok(NewSnapshot {
        owner: owner.clone(),
        schema: schema.to_string(),
        actor_id,
        active: true,
        payload: encode_payload(attributes)?,
        reason: reason.take(),
        created_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn candidate_is_active_and_consumes_reason() {
        let attrs: Attributes = serde_json::from_value(json!({"title": "Hello"})).unwrap();
        let mut reason = Some("typo fix".to_string());
        let owner = OwnerRef::new("article", "7");

        let candidate = build_candidate(
            &owner,
            "version",
            &attrs,
            Some("alice".to_string()),
            &mut reason,
            OffsetDateTime::UNIX_EPOCH,
        )
        .unwrap();

        assert!(candidate.active);
        assert_eq!(candidate.owner, owner);
        assert_eq!(candidate.reason.as_deref(), Some("typo fix"));
        assert_eq!(candidate.actor_id.as_deref(), Some("alice"));
        assert_eq!(reason, None);
        assert_eq!(decode_payload(&candidate.payload).unwrap(), attrs);
    }

    #[test]
    fn decode_rejects_non_object_payload() {
        assert!(decode_payload("[1,2,3]").is_err());
    }
}
