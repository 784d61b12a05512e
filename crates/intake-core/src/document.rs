// SPDX-License-Identifier: Apache-2.0

//! The path-update engine: a pure transform applying one `(path, value)`
//! write to a document snapshot. The caller owns persistence; nothing here
//! touches storage.

use crate::path::FieldPath;
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// The document root is not a mapping.
    NotAnObject,
    /// An intermediate segment resolved to an existing non-mapping value.
    /// The write is refused and the document left unchanged rather than
    /// silently replacing that value with a mapping.
    Conflict { at: String },
}

impl Display for PatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "document content is not a mapping"),
            Self::Conflict { at } => {
                write!(f, "path conflict: `{at}` holds a non-mapping value")
            }
        }
    }
}

impl std::error::Error for PatchError {}

/// Walks every path segment but the last, materializing an empty mapping for
/// each missing intermediate key, then sets the value at the final segment,
/// replacing whatever was there (mapping, primitive, or absent).
pub fn apply_patch(data: &mut Value, path: &FieldPath, value: Value) -> Result<(), PatchError> {
    let segments: Vec<&str> = path.segments().collect();
    let Some((last, prefix)) = segments.split_last() else {
        return Err(PatchError::NotAnObject);
    };

    let mut current = data.as_object_mut().ok_or(PatchError::NotAnObject)?;
    for (index, segment) in prefix.iter().enumerate() {
        let slot = current
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match slot.as_object_mut() {
            Some(next) => current = next,
            None => {
                return Err(PatchError::Conflict {
                    at: segments[..=index].join("."),
                })
            }
        }
    }
    current.insert((*last).to_string(), value);
    Ok(())
}

/// Reads the value at `path`, or `None` when any segment is absent or an
/// intermediate is not a mapping.
#[must_use]
pub fn value_at<'a>(data: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    let mut current = data;
    for segment in path.segments() {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw).expect("valid path")
    }

    #[test]
    fn sets_value_at_depth_one() {
        let mut data = json!({});
        apply_patch(&mut data, &path("summary"), json!("clean")).expect("patch");
        assert_eq!(data, json!({"summary": "clean"}));
    }

    #[test]
    fn materializes_missing_intermediates() {
        let mut data = json!({});
        apply_patch(&mut data, &path("sections.exterior.notes"), json!("scratch on door"))
            .expect("patch");
        assert_eq!(
            data,
            json!({"sections": {"exterior": {"notes": "scratch on door"}}})
        );
    }

    #[test]
    fn replaces_existing_final_value() {
        let mut data = json!({"a": {"b": 1}});
        apply_patch(&mut data, &path("a.b"), json!({"nested": true})).expect("patch");
        assert_eq!(data, json!({"a": {"b": {"nested": true}}}));
    }

    #[test]
    fn preserves_sibling_fields() {
        let mut data = json!({"a": {"keep": "me"}});
        apply_patch(&mut data, &path("a.b"), json!(2)).expect("patch");
        assert_eq!(data, json!({"a": {"keep": "me", "b": 2}}));
    }

    #[test]
    fn is_idempotent() {
        let mut once = json!({});
        apply_patch(&mut once, &path("x.y"), json!([1, 2])).expect("patch");
        let mut twice = once.clone();
        apply_patch(&mut twice, &path("x.y"), json!([1, 2])).expect("patch");
        assert_eq!(once, twice);
    }

    #[test]
    fn accepts_null_and_composite_values() {
        let mut data = json!({});
        apply_patch(&mut data, &path("a"), Value::Null).expect("patch");
        apply_patch(&mut data, &path("b"), json!({"k": [true, null]})).expect("patch");
        assert_eq!(data, json!({"a": null, "b": {"k": [true, null]}}));
    }

    #[test]
    fn patch_through_scalar_prefix_is_refused() {
        let mut data = json!({"mileage": 42});
        let before = data.clone();
        let err = apply_patch(&mut data, &path("mileage.reading"), json!(43))
            .expect_err("must refuse");
        assert_eq!(
            err,
            PatchError::Conflict {
                at: "mileage".to_string()
            }
        );
        assert_eq!(data, before, "refused patch must not modify the document");
    }

    #[test]
    fn conflict_reports_the_deep_segment() {
        let mut data = json!({"a": {"b": "leaf"}});
        let err = apply_patch(&mut data, &path("a.b.c.d"), json!(1)).expect_err("must refuse");
        assert_eq!(
            err,
            PatchError::Conflict {
                at: "a.b".to_string()
            }
        );
    }

    #[test]
    fn rejects_non_mapping_root() {
        let mut data = json!("scalar");
        assert_eq!(
            apply_patch(&mut data, &path("a"), json!(1)),
            Err(PatchError::NotAnObject)
        );
    }

    #[test]
    fn reads_back_patched_value() {
        let mut data = json!({});
        apply_patch(&mut data, &path("exterior.paintCondition"), json!("good")).expect("patch");
        apply_patch(&mut data, &path("exterior.photos.count"), json!(4)).expect("patch");
        assert_eq!(
            data.get("exterior"),
            Some(&json!({"paintCondition": "good", "photos": {"count": 4}}))
        );
        assert_eq!(
            value_at(&data, &path("exterior.photos.count")),
            Some(&json!(4))
        );
        assert_eq!(value_at(&data, &path("exterior.missing")), None);
    }
}
