//! Attribute differ: which attributes changed since the last persist.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::attributes::{numbers_eq, Attributes};

/// Names of attributes whose value in `current` differs from `persisted`.
///
/// Numbers are compared numerically so a float/integer re-encoding of the
/// same value is not a change; every other value is compared exactly. An
/// attribute present in `persisted` but missing from `current` is dirty.
pub fn dirty_attributes(persisted: &Attributes, current: &Attributes) -> BTreeSet<String> {
    let mut dirty: BTreeSet<String> = current
        .iter()
        .filter(|(name, value)| {
            persisted
                .get(name.as_str())
                .map_or(true, |old| differs(old, value))
        })
        .map(|(name, _)| name.clone())
        .collect();
    dirty.extend(
        persisted
            .keys()
            .filter(|name| !current.contains_key(name.as_str()))
            .cloned(),
    );
    dirty
}

fn differs(old: &Value, new: &Value) -> bool {
    match (old, new) {
        (Value::Number(a), Value::Number(b)) => !numbers_eq(a, b),
        _ => old != new,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn unchanged_record_has_no_dirty_attributes() {
        let a = attrs(json!({"title": "Hello", "views": 3}));
        assert!(dirty_attributes(&a, &a).is_empty());
    }

    #[test]
    fn changed_and_new_attributes_are_dirty() {
        let before = attrs(json!({"title": "Hello", "views": 3}));
        let after = attrs(json!({"title": "Hello!", "views": 3, "body": "x"}));
        let dirty = dirty_attributes(&before, &after);
        assert_eq!(
            dirty.into_iter().collect::<Vec<_>>(),
            vec!["body".to_string(), "title".to_string()]
        );
    }

    #[test]
    fn removed_attribute_is_dirty() {
        let before = attrs(json!({"title": "Hello", "subtitle": "x"}));
        let after = attrs(json!({"title": "Hello"}));
        assert!(dirty_attributes(&before, &after).contains("subtitle"));
    }

    #[test]
    fn float_reencoding_is_not_a_change() {
        let before = attrs(json!({"price": 10}));
        let after = attrs(json!({"price": 10.0}));
        assert!(dirty_attributes(&before, &after).is_empty());
    }

    #[test]
    fn numeric_string_is_a_change() {
        let before = attrs(json!({"price": 10}));
        let after = attrs(json!({"price": "10"}));
        assert!(dirty_attributes(&before, &after).contains("price"));
    }

    #[test]
    fn create_marks_every_attribute_dirty() {
        let after = attrs(json!({"title": "Hello", "body": null}));
        assert_eq!(dirty_attributes(&Attributes::new(), &after).len(), 2);
    }
}
