//! The Chord ring node: one instance per ring, per peer. Owns ring-position
//! state, the key-value store for its arc, and the replica store for the
//! arc immediately counter-clockwise.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;

use log::{debug, warn};
use tokio::fs;

use crate::rpc::dht_session::DhtSession;
use crate::utils::constants::ID_BITS;
use crate::utils::crypto::{belongs, between_open, hash, NodeId};
use crate::utils::error::{DistorageError, Result};
use crate::utils::types::{Address, DhtId, ElemValue};

use super::finger_table::FingerTable;

struct StoredElem {
    key: String,
    value: ElemValue,
}

struct ChordNodeState {
    predecessor: Option<Address>,
    successor: Address,
    fingers: FingerTable,
    next_finger: usize,
    elems: HashMap<NodeId, StoredElem>,
    repl_elems: HashMap<NodeId, StoredElem>,
    removed_elems: HashSet<NodeId>,
}

pub struct ChordNode {
    pub ip: Address,
    pub node_id: NodeId,
    pub dht_id: DhtId,
    secret: String,
    state: Mutex<ChordNodeState>,
}

/// Snapshot of a node's maintenance state, used by debugging RPCs and
/// `clusterctl`.
pub struct NodeSummary {
    pub ip: Address,
    pub node_id: NodeId,
    pub predecessor: Option<Address>,
    pub successor: Address,
    pub elems_count: usize,
    pub repl_elems_count: usize,
    pub removed_elems_count: usize,
}

impl ChordNode {
    pub fn new(ip: Address, dht_id: DhtId, secret: String) -> ChordNode {
        let node_id = hash(&ip);
        ChordNode {
            node_id,
            dht_id,
            secret,
            ip: ip.clone(),
            state: Mutex::new(ChordNodeState {
                predecessor: None,
                successor: ip.clone(),
                fingers: FingerTable::new(node_id, &ip),
                next_finger: 0,
                elems: HashMap::new(),
                repl_elems: HashMap::new(),
                removed_elems: HashSet::new(),
            }),
        }
    }

    pub fn successor(&self) -> Address {
        self.state.lock().unwrap().successor.clone()
    }

    pub fn predecessor(&self) -> Option<Address> {
        self.state.lock().unwrap().predecessor.clone()
    }

    pub fn set_successor(&self, addr: Address) {
        let mut state = self.state.lock().unwrap();
        state.successor = addr.clone();
        state.fingers.set(0, addr);
    }

    pub fn summary(&self) -> NodeSummary {
        let state = self.state.lock().unwrap();
        NodeSummary {
            ip: self.ip.clone(),
            node_id: self.node_id,
            predecessor: state.predecessor.clone(),
            successor: state.successor.clone(),
            elems_count: state.elems.len(),
            repl_elems_count: state.repl_elems.len(),
            removed_elems_count: state.removed_elems.len(),
        }
    }

    pub fn finger_snapshot(&self) -> Vec<(NodeId, Address)> {
        self.state
            .lock()
            .unwrap()
            .fingers
            .fingers
            .iter()
            .map(|f| (f.target, f.address.clone()))
            .collect()
    }

    fn closest_preceding_node(&self, id: NodeId) -> Address {
        let state = self.state.lock().unwrap();
        for finger in state.fingers.fingers.iter().rev() {
            if finger.address.is_empty() {
                continue;
            }
            let finger_id = hash(&finger.address);
            if between_open(finger_id, self.node_id, id) {
                return finger.address.clone();
            }
        }
        self.ip.clone()
    }

    /// `find_successor(id)`: returns the node this node believes is
    /// responsible for `id`, recursing through the finger table via RPC as
    /// needed.
    pub async fn find_successor(&self, id: NodeId) -> Result<Address> {
        let succ_addr = self.successor();
        let succ_id = hash(&succ_addr);
        if belongs(id, self.node_id, succ_id) {
            return Ok(succ_addr);
        }
        let closest = self.closest_preceding_node(id);
        if closest == self.ip {
            return Ok(self.ip.clone());
        }
        let session = DhtSession::acquire(&closest, self.dht_id, &self.secret).await?;
        session.find_successor(id).await
    }

    /// Client-side half of `join`: ask `bootstrap_ip` where we belong and
    /// adopt the answer as our successor.
    pub async fn join_cluster(&self, bootstrap_ip: &str) -> Result<()> {
        let session = DhtSession::acquire(bootstrap_ip, self.dht_id, &self.secret).await?;
        let new_successor = session.join(&self.ip).await?;
        self.set_successor(new_successor);
        Ok(())
    }

    /// Server-side half of `join`, run on whichever node receives the RPC.
    /// Finds the true owner of `new_node_ip`'s position; the owner accepts
    /// it as a tentative predecessor (stabilize firms this up later) and
    /// reports itself back, otherwise the call is forwarded further.
    pub async fn handle_join(&self, new_node_ip: &str) -> Result<Address> {
        let new_id = hash(new_node_ip);
        let owner = self.find_successor(new_id).await?;
        if owner == self.ip {
            self.notify(new_node_ip).await;
            return Ok(self.ip.clone());
        }
        let session = DhtSession::acquire(&owner, self.dht_id, &self.secret).await?;
        session.join(new_node_ip).await
    }

    /// Periodic: repair the immediate successor pointer and notify it.
    ///
    /// When `successor == self` this still has work to do: "ask the
    /// successor for its predecessor" is just reading our own
    /// `predecessor` field, no RPC involved. That degenerate path is what
    /// lets a lone bootstrap node pick up its first real successor — a
    /// join sets the bootstrap's `predecessor` directly (§4.1) but never
    /// touches its `successor`; were this truly a no-op whenever
    /// `successor == self`, a single-node ring could never grow one. It's
    /// a genuine no-op only in the fully-isolated case (no predecessor
    /// either).
    pub async fn stabilize(&self) {
        let succ_addr = self.successor();

        let pred_of_succ = if succ_addr == self.ip {
            self.predecessor()
        } else {
            let session = match DhtSession::acquire(&succ_addr, self.dht_id, &self.secret).await {
                Ok(s) => s,
                Err(e) => {
                    warn!("stabilize: successor {succ_addr} unreachable ({e}), resetting to self");
                    self.set_successor(self.ip.clone());
                    return;
                }
            };
            match session.get_predecessor().await {
                Ok(p) => p,
                Err(e) => {
                    warn!("stabilize: get_predecessor on {succ_addr} failed ({e}), resetting to self");
                    self.set_successor(self.ip.clone());
                    return;
                }
            }
        };

        if let Some(p) = pred_of_succ.filter(|p| !p.is_empty()) {
            let p_id = hash(&p);
            let succ_id = hash(&succ_addr);
            if belongs(p_id, self.node_id, succ_id) {
                self.adopt_new_successor(p).await;
            }
        }

        let succ_now = self.successor();
        if succ_now == self.ip {
            return;
        }
        match DhtSession::acquire(&succ_now, self.dht_id, &self.secret).await {
            Ok(session2) => {
                if let Err(e) = session2.notify(&self.ip).await {
                    warn!("stabilize: notify on {succ_now} failed: {e}");
                }
            }
            Err(e) => {
                warn!("stabilize: successor {succ_now} unreachable for notify ({e}), resetting to self");
                self.set_successor(self.ip.clone());
            }
        }
    }

    async fn adopt_new_successor(&self, new_successor: Address) {
        self.set_successor(new_successor.clone());
        self.resend_elems_as_replicas(&new_successor).await;
    }

    async fn resend_elems_as_replicas(&self, successor_addr: &Address) {
        let snapshot: Vec<(String, ElemValue)> = {
            let state = self.state.lock().unwrap();
            state
                .elems
                .values()
                .map(|e| (e.key.clone(), e.value.clone()))
                .collect()
        };
        let session = match DhtSession::acquire(successor_addr, self.dht_id, &self.secret).await {
            Ok(s) => s,
            Err(e) => {
                warn!("could not reach new successor {successor_addr} to replicate data: {e}");
                return;
            }
        };
        for (key, value) in snapshot {
            let wire_value = self.materialize_for_wire(&value).await;
            if let Err(e) = session.store_replica(&key, wire_value, None).await {
                warn!("replicating {key} to {successor_addr} failed: {e}");
            }
        }
    }

    /// `notify(candidate_ip)`: accept `candidate_ip` as predecessor if none
    /// is set, or if it's a genuine improvement — never on a no-op update
    /// to the same address.
    pub async fn notify(&self, candidate_ip: &str) {
        let should_update = {
            let state = self.state.lock().unwrap();
            match &state.predecessor {
                None => true,
                Some(pred) if pred == candidate_ip => false,
                Some(pred) => {
                    let cand_id = hash(candidate_ip);
                    let pred_id = hash(pred);
                    belongs(cand_id, pred_id, self.node_id)
                }
            }
        };
        if !should_update {
            return;
        }
        {
            let mut state = self.state.lock().unwrap();
            state.predecessor = Some(candidate_ip.to_string());
        }
        debug!("accepted {candidate_ip} as new predecessor");
        if self.successor() == self.ip {
            // We were alone: the peer that just became our predecessor is,
            // in a still-tiny ring, also the only candidate for successor.
            // Without this the handoff below has no correct remote owner
            // to route misplaced keys to (find_successor would still
            // resolve to self), and a lone bootstrap node would never pick
            // up its first real successor except by way of its own next
            // stabilize tick — see the matching note on `stabilize`.
            self.adopt_new_successor(candidate_ip.to_string()).await;
        }
        self.handoff_on_new_predecessor(candidate_ip).await;
    }

    /// Ownership handoff: anything in `elems` that no longer falls in
    /// `(new_predecessor_id, self.node_id]` is migrated out via a normal
    /// routed `store`, tombstone-checked so a stale handoff can't resurrect
    /// an explicitly deleted key.
    async fn handoff_on_new_predecessor(&self, new_pred_ip: &str) {
        let p_id = hash(new_pred_ip);
        let to_move: Vec<(NodeId, String, ElemValue)> = {
            let state = self.state.lock().unwrap();
            state
                .elems
                .iter()
                .filter(|(id, _)| !belongs(**id, p_id, self.node_id))
                .map(|(id, e)| (*id, e.key.clone(), e.value.clone()))
                .collect()
        };
        for (id, key, value) in to_move {
            let wire_value = self.materialize_for_wire(&value).await;
            match self.store(&key, wire_value, true, true, None).await {
                Ok(()) => {
                    self.state.lock().unwrap().elems.remove(&id);
                    if let ElemValue::Path(path) = &value {
                        let _ = std::fs::remove_file(path);
                    }
                }
                Err(e) => warn!("handoff of {key} to its new owner failed, keeping locally: {e}"),
            }
        }
    }

    /// Periodic: advance `next_finger` and refresh that single finger entry.
    pub async fn fix_fingers(&self) {
        let next = {
            let mut state = self.state.lock().unwrap();
            state.next_finger = (state.next_finger + 1) % ID_BITS;
            state.next_finger
        };
        let target = self.node_id.plus_two_pow(next as u32);
        match self.find_successor(target).await {
            Ok(addr) => self.state.lock().unwrap().fingers.set(next, addr),
            Err(e) => {
                debug!("fix_fingers: lookup for index {next} failed: {e}");
                self.state.lock().unwrap().fingers.set(next, String::new());
            }
        }
    }

    /// Periodic: probe the predecessor with a bare connect/close. On
    /// failure, clear it and promote every replica into primary storage —
    /// the dead predecessor's arc is now ours.
    pub async fn check_predecessor(&self) {
        let pred = self.predecessor();
        let Some(pred_addr) = pred else { return };
        let reachable = DhtSession::acquire(&pred_addr, self.dht_id, &self.secret)
            .await
            .is_ok();
        if !reachable {
            warn!("predecessor {pred_addr} unreachable, clearing and promoting replicas");
            self.clear_predecessor_and_promote();
        }
    }

    fn clear_predecessor_and_promote(&self) {
        let mut state = self.state.lock().unwrap();
        state.predecessor = None;
        let promoted: Vec<(NodeId, StoredElem)> = state.repl_elems.drain().collect();
        for (id, elem) in promoted {
            state.elems.insert(id, elem);
        }
    }

    async fn maybe_load_from_disk(&self, value: ElemValue, is_file: bool) -> Result<ElemValue> {
        if is_file {
            if let ElemValue::Path(path) = &value {
                let bytes = fs::read(path)
                    .await
                    .map_err(|e| DistorageError::NotFound(e.to_string()))?;
                return Ok(ElemValue::Bytes(bytes));
            }
        }
        Ok(value)
    }

    async fn materialize_for_wire(&self, value: &ElemValue) -> ElemValue {
        if let ElemValue::Path(path) = value {
            match fs::read(path).await {
                Ok(bytes) => ElemValue::Bytes(bytes),
                Err(e) => {
                    warn!("failed to read persisted value at {path:?}: {e}");
                    value.clone()
                }
            }
        } else {
            value.clone()
        }
    }

    /// `find(key, is_file)`: replicas are checked first (a fast path that
    /// survives a temporarily unreachable primary), then routed lookup.
    pub async fn find(&self, key: &str, is_file: bool) -> Result<Option<ElemValue>> {
        let id = hash(key);

        let local_replica = self.state.lock().unwrap().repl_elems.get(&id).map(|e| e.value.clone());
        if let Some(value) = local_replica {
            return Ok(Some(self.maybe_load_from_disk(value, is_file).await?));
        }

        let succ = self.find_successor(id).await?;
        if succ == self.ip {
            let tombstoned = self.state.lock().unwrap().removed_elems.contains(&id);
            if tombstoned {
                return Ok(None);
            }
            let value = {
                let state = self.state.lock().unwrap();
                state
                    .elems
                    .get(&id)
                    .or_else(|| state.repl_elems.get(&id))
                    .map(|e| e.value.clone())
            };
            match value {
                Some(v) => Ok(Some(self.maybe_load_from_disk(v, is_file).await?)),
                None => Ok(None),
            }
        } else {
            let session = DhtSession::acquire(&succ, self.dht_id, &self.secret).await?;
            session.find(key, is_file).await
        }
    }

    /// `store(key, value, overwrite, check_removed, persist_path)`.
    pub async fn store(
        &self,
        key: &str,
        value: ElemValue,
        overwrite: bool,
        check_removed: bool,
        persist_path: Option<PathBuf>,
    ) -> Result<()> {
        let id = hash(key);
        let succ = self.find_successor(id).await?;
        if succ != self.ip {
            let session = DhtSession::acquire(&succ, self.dht_id, &self.secret).await?;
            return session.store(key, value, overwrite, check_removed, persist_path).await;
        }

        if !overwrite && self.state.lock().unwrap().elems.contains_key(&id) {
            return Err(DistorageError::Conflict(format!("key already exists: {key}")));
        }
        if check_removed && self.state.lock().unwrap().removed_elems.contains(&id) {
            return Err(DistorageError::Tombstoned(key.to_string()));
        }

        let stored_value = self.persist_if_requested(&value, persist_path.as_deref()).await?;

        {
            let mut state = self.state.lock().unwrap();
            state.elems.insert(
                id,
                StoredElem {
                    key: key.to_string(),
                    value: stored_value.clone(),
                },
            );
            state.removed_elems.remove(&id);
        }

        let succ_addr = self.successor();
        if succ_addr != self.ip {
            match DhtSession::acquire(&succ_addr, self.dht_id, &self.secret).await {
                Ok(session) => {
                    let wire_value = self.materialize_for_wire(&stored_value).await;
                    if let Err(e) = session.store_replica(key, wire_value, persist_path).await {
                        warn!("replica store of {key} to {succ_addr} failed: {e}");
                    }
                }
                Err(e) => warn!("could not reach successor {succ_addr} for replica store: {e}"),
            }
        }
        Ok(())
    }

    /// `store_replica(key, value, persist_path)`: always local, into
    /// `repl_elems`; tombstones are not consulted.
    pub async fn store_replica(
        &self,
        key: &str,
        value: ElemValue,
        persist_path: Option<PathBuf>,
    ) -> Result<()> {
        let id = hash(key);
        let stored_value = self.persist_if_requested(&value, persist_path.as_deref()).await?;
        self.state.lock().unwrap().repl_elems.insert(
            id,
            StoredElem {
                key: key.to_string(),
                value: stored_value,
            },
        );
        Ok(())
    }

    async fn persist_if_requested(&self, value: &ElemValue, persist_path: Option<&std::path::Path>) -> Result<ElemValue> {
        match persist_path {
            Some(path) => {
                let bytes = value.as_bytes_lossy();
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)
                        .await
                        .map_err(|e| DistorageError::InvalidInput(e.to_string()))?;
                }
                fs::write(path, &bytes)
                    .await
                    .map_err(|e| DistorageError::InvalidInput(e.to_string()))?;
                Ok(ElemValue::Path(path.to_path_buf()))
            }
            None => Ok(value.clone()),
        }
    }

    /// `remove(key)`: routed like `store`.
    pub async fn remove(&self, key: &str) -> Result<()> {
        let id = hash(key);
        let succ = self.find_successor(id).await?;
        if succ != self.ip {
            let session = DhtSession::acquire(&succ, self.dht_id, &self.secret).await?;
            return session.remove(key).await;
        }

        {
            let mut state = self.state.lock().unwrap();
            state.elems.remove(&id);
            state.repl_elems.remove(&id);
            state.removed_elems.insert(id);
        }

        let succ_addr = self.successor();
        if succ_addr != self.ip {
            match DhtSession::acquire(&succ_addr, self.dht_id, &self.secret).await {
                Ok(session) => {
                    if let Err(e) = session.remove_replica(key).await {
                        warn!("replica remove of {key} on {succ_addr} failed: {e}");
                    }
                }
                Err(e) => warn!("could not reach successor {succ_addr} for replica remove: {e}"),
            }
        }
        Ok(())
    }

    pub async fn remove_replica(&self, key: &str) -> Result<()> {
        let id = hash(key);
        self.state.lock().unwrap().repl_elems.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> ChordNode {
        ChordNode::new("127.0.0.1:9000".to_string(), DhtId::Data, "s3cr3t".to_string())
    }

    #[tokio::test]
    async fn single_node_round_trip() {
        let n = node();
        n.store("alice:doc.txt", ElemValue::Bytes(b"hello".to_vec()), true, false, None)
            .await
            .unwrap();
        let found = n.find("alice:doc.txt", false).await.unwrap();
        assert_eq!(found, Some(ElemValue::Bytes(b"hello".to_vec())));
    }

    #[tokio::test]
    async fn conflict_without_overwrite() {
        let n = node();
        n.store("k", ElemValue::Bytes(b"1".to_vec()), false, false, None)
            .await
            .unwrap();
        let err = n
            .store("k", ElemValue::Bytes(b"2".to_vec()), false, false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DistorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn remove_then_find_returns_none() {
        let n = node();
        n.store("k", ElemValue::Bytes(b"1".to_vec()), true, false, None)
            .await
            .unwrap();
        n.remove("k").await.unwrap();
        assert_eq!(n.find("k", false).await.unwrap(), None);
    }

    #[tokio::test]
    async fn tombstone_suppresses_but_reports_ok() {
        let n = node();
        n.store("k", ElemValue::Bytes(b"1".to_vec()), true, false, None)
            .await
            .unwrap();
        n.remove("k").await.unwrap();

        // A replication-driven store must not resurrect the tombstoned key.
        let err = n
            .store("k", ElemValue::Bytes(b"replica-replay".to_vec()), true, true, None)
            .await
            .unwrap_err();
        assert!(err.is_benign_ok());
        assert_eq!(err.as_msg(), crate::utils::constants::TOMBSTONED_MSG);
        assert_eq!(n.find("k", false).await.unwrap(), None);

        // An explicit (non-check_removed) store clears the tombstone.
        n.store("k", ElemValue::Bytes(b"fresh".to_vec()), true, false, None)
            .await
            .unwrap();
        assert_eq!(n.find("k", false).await.unwrap(), Some(ElemValue::Bytes(b"fresh".to_vec())));
    }

    #[tokio::test]
    async fn persist_path_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alice").join("doc.txt");
        let n = node();
        n.store(
            "alice:doc.txt",
            ElemValue::Bytes(b"contents".to_vec()),
            true,
            false,
            Some(path.clone()),
        )
        .await
        .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"contents");
        let found = n.find("alice:doc.txt", true).await.unwrap();
        assert_eq!(found, Some(ElemValue::Bytes(b"contents".to_vec())));
    }

    #[tokio::test]
    async fn check_predecessor_promotes_replicas_when_unset() {
        let n = node();
        n.store_replica("k1", ElemValue::Bytes(b"v1".to_vec()), None).await.unwrap();
        n.store_replica("k2", ElemValue::Bytes(b"v2".to_vec()), None).await.unwrap();
        assert_eq!(n.summary().repl_elems_count, 2);
        n.clear_predecessor_and_promote();
        let summary = n.summary();
        assert_eq!(summary.repl_elems_count, 0);
        assert_eq!(summary.elems_count, 2);
    }

    #[test]
    fn fresh_node_fingers_all_point_to_self() {
        let n = node();
        let fingers = n.finger_snapshot();
        assert_eq!(fingers.len(), ID_BITS);
        assert!(fingers.iter().all(|(_, addr)| addr == &n.ip));
    }
}
