//! Serializer
//!
//! Body encoding seam used by policies and page sources.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{PipelineResult, SerializationError};

/// Serializer interface.
pub trait Serializer: Send + Sync {
    /// Media type written to `Content-Type`.
    fn content_type(&self) -> &'static str;

    fn serialize<T: Serialize>(&self, value: &T) -> PipelineResult<Vec<u8>>;

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> PipelineResult<T>;
}

/// serde_json backed serializer.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn serialize<T: Serialize>(&self, value: &T) -> PipelineResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| {
            SerializationError::Encode {
                message: e.to_string(),
            }
            .into()
        })
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> PipelineResult<T> {
        serde_json::from_slice(bytes).map_err(|e| {
            SerializationError::Decode {
                message: e.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Blob {
        name: String,
        size: u64,
    }

    #[test]
    fn test_json_serializer() {
        let blob = Blob {
            name: "a.txt".to_string(),
            size: 12,
        };
        let bytes = JsonSerializer.serialize(&blob).unwrap();
        let decoded: Blob = JsonSerializer.deserialize(&bytes).unwrap();
        assert_eq!(decoded, blob);
        assert_eq!(JsonSerializer.content_type(), "application/json");
    }

    #[test]
    fn test_decode_error() {
        let result: PipelineResult<Blob> = JsonSerializer.deserialize(b"{not json");
        assert!(matches!(
            result,
            Err(PipelineError::Serialization(SerializationError::Decode { .. }))
        ));
    }
}
