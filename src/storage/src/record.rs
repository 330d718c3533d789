//! Self-describing record envelope. Every persisted value is JSON of the
//! form `{"schema": <version>, "body": <record>}` so a store can be read
//! back safely across releases.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::port::StorageError;

/// Version written with every record. Decoding rejects anything else.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    schema : u32,
    body   : T,
}

pub fn encode<T: Serialize>(key: &str, body: &T) -> Result<Vec<u8>, StorageError> {
    let envelope = Envelope { schema: SCHEMA_VERSION, body };
    serde_json::to_vec(&envelope).map_err(|source| StorageError::Serialize {
        key: key.to_string(),
        source,
    })
}

pub fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, StorageError> {
    let envelope: Envelope<T> = serde_json::from_slice(bytes).map_err(|err| StorageError::Corrupt {
        key: key.to_string(),
        detail: err.to_string(),
    })?;
    if envelope.schema != SCHEMA_VERSION {
        return Err(StorageError::UnsupportedSchema {
            key: key.to_string(),
            found: envelope.schema,
            expected: SCHEMA_VERSION,
        });
    }
    Ok(envelope.body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn roundtrip() -> Result<()> {
        let bytes = encode("seq/g1", &vec![1u32, 2, 3])?;
        let decoded: Vec<u32> = decode("seq/g1", &bytes)?;
        assert_eq!(decoded, vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn reject_unknown_schema() {
        let bytes = br#"{"schema": 99, "body": []}"#;
        let result: Result<Vec<u32>, StorageError> = decode("seq/g1", bytes);
        assert!(matches!(
            result,
            Err(StorageError::UnsupportedSchema { found: 99, expected: SCHEMA_VERSION, .. })
        ));
    }

    #[test]
    fn reject_garbage() {
        let result: Result<Vec<u32>, StorageError> = decode("seq/g1", b"not json");
        assert!(matches!(result, Err(StorageError::Corrupt { .. })));
    }
}
