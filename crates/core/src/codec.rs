//! Compiled-unit codecs.
//!
//! A codec turns the bytes of one archive entry into a [`TypeDef`] and back.
//! Encoding receives the common-ancestor resolver because a binary codec must
//! merge reference types when it recomputes verifier frames.

use crate::hierarchy::CommonAncestorResolver;
use crate::program::TypeDef;
use classcloak_utils::errors::{LoadError, SerializeError};

pub trait ClassCodec {
    /// Entry-name suffix identifying compiled units in a container.
    fn suffix(&self) -> &'static str;

    fn decode(&self, entry: &str, data: &[u8]) -> Result<TypeDef, LoadError>;

    fn encode(
        &self,
        ty: &TypeDef,
        resolver: &CommonAncestorResolver<'_>,
    ) -> Result<Vec<u8>, SerializeError>;
}

/// Stores each type as the JSON form of the in-memory model.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ClassCodec for JsonCodec {
    fn suffix(&self) -> &'static str {
        ".class.json"
    }

    fn decode(&self, entry: &str, data: &[u8]) -> Result<TypeDef, LoadError> {
        serde_json::from_slice(data).map_err(|e| LoadError::Codec {
            entry: entry.to_string(),
            reason: e.to_string(),
        })
    }

    fn encode(
        &self,
        ty: &TypeDef,
        _resolver: &CommonAncestorResolver<'_>,
    ) -> Result<Vec<u8>, SerializeError> {
        serde_json::to_vec_pretty(ty).map_err(|e| SerializeError::Codec {
            ty: ty.name.clone(),
            reason: e.to_string(),
        })
    }
}
