use crate::utils::constants::ID_BITS;
use crate::utils::crypto::NodeId;
use crate::utils::types::Address;

/// One entry in the 160-slot finger table. `target` is the static ring
/// position `node_id + 2^i` this slot refreshes towards (computed once at
/// construction); `address` is the last node `fix_fingers` resolved for it.
#[derive(Debug, Clone)]
pub struct FingerEntry {
    pub target: NodeId,
    pub address: Address,
}

impl FingerEntry {
    pub fn new(target: NodeId, address: Address) -> Self {
        FingerEntry { target, address }
    }
}

#[derive(Debug, Clone)]
pub struct FingerTable {
    pub fingers: Vec<FingerEntry>,
}

impl FingerTable {
    /// `fingers[i].target = node_id + 2^i (mod 2^160)`, every entry
    /// initially pointing at `address` (self, at construction time).
    pub fn new(node_id: NodeId, address: &Address) -> FingerTable {
        let fingers = (0..ID_BITS as u32)
            .map(|i| FingerEntry::new(node_id.plus_two_pow(i), address.clone()))
            .collect();
        FingerTable { fingers }
    }

    pub fn set(&mut self, index: usize, address: Address) {
        self.fingers[index].address = address;
    }
}
