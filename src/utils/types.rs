//! Shared value types threaded through the ring, session and RPC layers.

use std::path::PathBuf;

/// A peer's network address, always `ip:port`. Peers are never cached as
/// objects across calls — every cross-peer interaction re-resolves this
/// string to a fresh transport (see DESIGN.md, "cyclic peer references").
pub type Address = String;

/// Which of the two rings a DHT RPC targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhtId {
    Client,
    Data,
}

impl DhtId {
    pub fn as_i32(&self) -> i32 {
        match self {
            DhtId::Client => 0,
            DhtId::Data => 1,
        }
    }

    pub fn from_i32(v: i32) -> Option<DhtId> {
        match v {
            0 => Some(DhtId::Client),
            1 => Some(DhtId::Data),
            _ => None,
        }
    }
}

/// A stored value is either an inline blob, a JSON-encoded string (account
/// records), or a path to a file persisted on disk for large blobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElemValue {
    Bytes(Vec<u8>),
    Json(String),
    Path(PathBuf),
}

impl ElemValue {
    pub fn as_bytes_lossy(&self) -> Vec<u8> {
        match self {
            ElemValue::Bytes(b) => b.clone(),
            ElemValue::Json(s) => s.clone().into_bytes(),
            ElemValue::Path(p) => p.to_string_lossy().into_owned().into_bytes(),
        }
    }
}
