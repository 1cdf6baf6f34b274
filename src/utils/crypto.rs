//! SHA-1 identifiers and ring-arithmetic helpers for the Chord rings.
//!
//! Node IDs and key IDs both live in the same 160-bit space produced by
//! SHA-1, interpreted big-endian. `NodeId` is a thin newtype so ring
//! arithmetic (wraparound addition of `2^i`) and ordering stay in one
//! place instead of being re-derived at every call site.

use std::fmt;

use sha1::{Digest, Sha1};

pub const ID_BYTES: usize = 20;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId([u8; ID_BYTES]);

impl NodeId {
    pub const ZERO: NodeId = NodeId([0u8; ID_BYTES]);

    pub fn from_bytes(bytes: [u8; ID_BYTES]) -> Self {
        NodeId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_BYTES] {
        &self.0
    }

    /// `self + 2^i (mod 2^160)`, the standard Chord finger target.
    pub fn plus_two_pow(&self, i: u32) -> NodeId {
        let mut addend = [0u8; ID_BYTES];
        // 2^i as a big-endian 160-bit integer: bit `i` set, counting from the
        // least-significant bit of the last byte.
        let byte_index = ID_BYTES - 1 - (i as usize / 8);
        addend[byte_index] = 1u8 << (i % 8);
        add_wrapping(&self.0, &addend)
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.to_hex())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

fn add_wrapping(a: &[u8; ID_BYTES], b: &[u8; ID_BYTES]) -> NodeId {
    let mut out = [0u8; ID_BYTES];
    let mut carry: u16 = 0;
    for i in (0..ID_BYTES).rev() {
        let sum = a[i] as u16 + b[i] as u16 + carry;
        out[i] = (sum & 0xff) as u8;
        carry = sum >> 8;
    }
    // carry past the most significant byte wraps around modulo 2^160, i.e. is dropped.
    NodeId(out)
}

/// Hashes an arbitrary string into the 160-bit ring space.
pub fn hash(value: &str) -> NodeId {
    let mut hasher = Sha1::new();
    hasher.update(value.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; ID_BYTES];
    bytes.copy_from_slice(&digest);
    NodeId(bytes)
}

/// Hashes a password for storage in an account record. Not a defense against
/// a hostile peer — there is no cryptographic peer authentication here;
/// it only keeps the plaintext password off disk and off the wire at rest.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(b"distorage-account-password");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `(lo < v <= hi) || (lo > hi && (v > lo || v <= hi))` — the half-open arc
/// `(lo, hi]` going clockwise around the ring, accounting for wrap-around.
pub fn belongs(v: NodeId, lo: NodeId, hi: NodeId) -> bool {
    if lo < hi {
        v > lo && v <= hi
    } else if lo > hi {
        v > lo || v <= hi
    } else {
        // lo == hi: the arc is either empty or the whole ring, depending on
        // convention. A single-node ring owns everything.
        true
    }
}

/// Open interval `(lo, hi)`, excluding both ends, with the same
/// wrap-around handling as [`belongs`]. Used by `closest_preceding_node`.
pub fn between_open(v: NodeId, lo: NodeId, hi: NodeId) -> bool {
    if lo < hi {
        v > lo && v < hi
    } else if lo > hi {
        v > lo || v < hi
    } else {
        v != lo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash("10.0.0.1:7200"), hash("10.0.0.1:7200"));
    }

    #[test]
    fn plus_two_pow_wraps() {
        let max = NodeId([0xff; ID_BYTES]);
        let wrapped = max.plus_two_pow(0);
        assert_eq!(wrapped, NodeId::ZERO);
    }

    #[test]
    fn plus_two_pow_sets_expected_bit() {
        let zero = NodeId::ZERO;
        let one = zero.plus_two_pow(0);
        assert_eq!(one.as_bytes()[ID_BYTES - 1], 1);
        let two56 = zero.plus_two_pow(8);
        assert_eq!(two56.as_bytes()[ID_BYTES - 2], 1);
        assert_eq!(two56.as_bytes()[ID_BYTES - 1], 0);
    }

    #[test]
    fn belongs_handles_normal_and_wraparound_arcs() {
        let a = NodeId::ZERO.plus_two_pow(4); // 16
        let b = NodeId::ZERO.plus_two_pow(8); // 256
        let c = NodeId::ZERO.plus_two_pow(2); // 4

        assert!(belongs(NodeId::ZERO.plus_two_pow(5), a, b)); // 32 in (16, 256]
        assert!(!belongs(c, a, b)); // 4 not in (16, 256]
        // wraparound arc (b, a] wraps past the top of the ring
        assert!(belongs(NodeId::ZERO, b, a));
        assert!(belongs(c, b, a));
        assert!(!belongs(NodeId::ZERO.plus_two_pow(7), b, a)); // 128 not in (256, 16]
    }
}
