//! Forward migration of older sidecar layouts.

use serde_json::{Map, Value};

use crate::error::{ErrorKind, Result};
use crate::models::CURRENT_VERSION;

/// Bring a parsed sidecar document up to [`CURRENT_VERSION`] in place.
///
/// Version 0 predates the `version` field and stored people as bare strings.
pub(crate) fn upgrade(document: &mut Map<String, Value>) -> Result<()> {
    let version = document.get("version").and_then(Value::as_u64).unwrap_or(0);
    if version > CURRENT_VERSION {
        exn::bail!(ErrorKind::UnsupportedVersion {
            found: version,
            supported: CURRENT_VERSION,
        });
    }
    if version == 0 {
        for key in ["authors", "narrators"] {
            if let Some(Value::Array(people)) = document.get_mut(key) {
                for person in people.iter_mut() {
                    if let Value::String(name) = person {
                        *person = Value::Object(Map::from_iter([("name".to_string(), Value::String(name.clone()))]));
                    }
                }
            }
        }
    }
    document.insert("version".to_string(), Value::from(CURRENT_VERSION));
    Ok(())
}
