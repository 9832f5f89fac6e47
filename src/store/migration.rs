//! Forward migration of persisted `definition_json` across schema
//! versions (§4.6: "each row's schemaVersion is normalized forward
//! through registered migrations up to the current version").
//!
//! Each migration is keyed by the version it migrates *from* and maps
//! the raw JSON document to its representation one version later.
//! There is currently only one schema version in circulation, so the
//! table is empty; a `v1 -> v2` migration would register itself here
//! the day a second version ships.

use serde_json::Value;

type Migration = fn(Value) -> Value;

fn migrations() -> &'static [(u32, Migration)] {
    &[]
}

/// Applies every registered migration from `source_version` up to
/// `target_version`, in order. Stamps the final `schemaVersion` onto the
/// result. A source version with no matching migration step is left
/// untouched except for the final stamp (that is the "no migrations
/// registered yet" case).
pub fn migrate_forward(mut value: Value, source_version: u32, target_version: u32) -> Value {
    let mut version = source_version;
    while version < target_version {
        let step = migrations().iter().find(|(from, _)| *from == version);
        match step {
            Some((_, migrate)) => {
                value = migrate(value);
                version += 1;
            }
            None => break,
        }
    }
    if let Some(obj) = value.as_object_mut() {
        obj.insert("schemaVersion".to_string(), Value::from(target_version.max(version)));
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn no_registered_migrations_just_stamps_target_version() {
        let input = json!({"schemaVersion": 1, "id": "r1"});
        let out = migrate_forward(input, 1, 1);
        assert_eq!(out["schemaVersion"], json!(1));
    }
}
