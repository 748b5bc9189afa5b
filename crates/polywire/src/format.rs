//! # Formats
//!
//! A Format is the concrete byte representation of a document tree. The codec builds
//! and reads `serde_json::Value` trees; a Format only turns trees into bytes and back,
//! so swapping formats never touches the type-directed logic.

use serde_json::Value as Tree;

use crate::error::Error;
use crate::error::Result;

pub trait Format: Send + Sync + 'static {
    /// Name used in logs and diagnostics.
    fn name(&self) -> &'static str;

    fn write(&self, tree: &Tree) -> Result<Vec<u8>>;

    fn read(&self, bytes: &[u8]) -> Result<Tree>;
}

/// Compact JSON text.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonFormat;

impl Format for JsonFormat {
    fn name(&self) -> &'static str {
        "json"
    }

    fn write(&self, tree: &Tree) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(tree)?)
    }

    fn read(&self, bytes: &[u8]) -> Result<Tree> {
        serde_json::from_slice(bytes).map_err(|e| Error::Format(format!("invalid json: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_preserves_key_order() {
        let tree = serde_json::json!({"type": "Dog", "name": "Rex", "age": 3});
        let bytes = JsonFormat.write(&tree).unwrap();
        assert_eq!(bytes, br#"{"type":"Dog","name":"Rex","age":3}"#);
    }

    #[test]
    fn test_json_rejects_garbage() {
        let err = JsonFormat.read(b"{oops").unwrap_err();
        assert!(matches!(err, Error::Format(msg) if msg.starts_with("invalid json")));
    }
}
