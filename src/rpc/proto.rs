//! Generated gRPC code (`proto/distorage.proto`) plus the handful of
//! conversions between the wire messages and the crate's own types: an
//! explicit `tonic`/`prost` schema rather than a reflection-based RPC
//! setup.

tonic::include_proto!("distorage");

use crate::utils::crypto::{NodeId, ID_BYTES};
use crate::utils::error::DistorageError;
use crate::utils::types::ElemValue;

impl From<ElemValue> for ValueMsg {
    fn from(value: ElemValue) -> Self {
        let kind = match value {
            ElemValue::Bytes(b) => value_msg::Kind::BytesValue(b),
            ElemValue::Json(s) => value_msg::Kind::JsonValue(s),
            ElemValue::Path(p) => value_msg::Kind::PathValue(p.to_string_lossy().into_owned()),
        };
        ValueMsg { kind: Some(kind) }
    }
}

impl TryFrom<ValueMsg> for ElemValue {
    type Error = DistorageError;

    fn try_from(msg: ValueMsg) -> Result<Self, Self::Error> {
        match msg.kind {
            Some(value_msg::Kind::BytesValue(b)) => Ok(ElemValue::Bytes(b)),
            Some(value_msg::Kind::JsonValue(s)) => Ok(ElemValue::Json(s)),
            Some(value_msg::Kind::PathValue(p)) => Ok(ElemValue::Path(p.into())),
            None => Err(DistorageError::InvalidInput("value must not be null".to_string())),
        }
    }
}

pub fn node_id_to_bytes(id: NodeId) -> Vec<u8> {
    id.as_bytes().to_vec()
}

pub fn bytes_to_node_id(bytes: &[u8]) -> Result<NodeId, DistorageError> {
    let arr: [u8; ID_BYTES] = bytes
        .try_into()
        .map_err(|_| DistorageError::InvalidInput("malformed 160-bit id".to_string()))?;
    Ok(NodeId::from_bytes(arr))
}
