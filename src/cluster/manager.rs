//! The process-wide peer/cluster manager. A single instance is built
//! before any listener binds and handed to every worker and RPC handler
//! as an `Arc`, so the global state itself is incidental rather than
//! load-bearing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::node::ChordNode;
use crate::utils::config::Config;
use crate::utils::types::{Address, DhtId};

use super::peer_table::PeerTable;

pub struct ClusterContext {
    pub config: Config,
    pub clients: ChordNode,
    pub data: ChordNode,
    peers: Mutex<PeerTable>,
    server_started: AtomicBool,
}

impl ClusterContext {
    pub fn new(config: Config) -> Self {
        let host_ip = config.host_ip.clone();
        let secret = config.secret.clone();
        ClusterContext {
            clients: ChordNode::new(host_ip.clone(), DhtId::Client, secret.clone()),
            data: ChordNode::new(host_ip, DhtId::Data, secret),
            peers: Mutex::new(PeerTable::new()),
            server_started: AtomicBool::new(false),
            config,
        }
    }

    pub fn ring(&self, dht_id: DhtId) -> &ChordNode {
        match dht_id {
            DhtId::Client => &self.clients,
            DhtId::Data => &self.data,
        }
    }

    pub fn host_ip(&self) -> Address {
        self.config.host_ip.clone()
    }

    pub fn mark_started(&self) {
        self.server_started.store(true, Ordering::SeqCst);
    }

    pub fn is_started(&self) -> bool {
        self.server_started.load(Ordering::SeqCst)
    }

    pub fn add_peer(&self, ip: &Address) {
        if ip == &self.host_ip() {
            return;
        }
        self.peers.lock().unwrap().mark_known(ip);
    }

    pub fn known_peers(&self) -> Vec<Address> {
        self.peers.lock().unwrap().known_ips()
    }

    pub fn is_known_peer(&self, ip: &Address) -> bool {
        self.peers.lock().unwrap().is_known(ip)
    }

    pub fn old_peers(&self) -> Vec<Address> {
        self.peers.lock().unwrap().old_ips()
    }

    pub fn demote_peer(&self, ip: &Address) {
        self.peers.lock().unwrap().demote_to_old(ip);
    }

    pub fn promote_peer(&self, ip: &Address) {
        self.peers.lock().unwrap().promote_from_old(ip);
    }

    /// `DISCOVER_TIMEOUT`: true (and demotes to `old`) if `ip` has gone
    /// quiet for too long.
    pub fn check_timeout(&self, ip: &Address) -> bool {
        let mut peers = self.peers.lock().unwrap();
        let Some(last_active) = peers.last_active(ip) else {
            return false;
        };
        if last_active.elapsed() > crate::utils::constants::DISCOVER_TIMEOUT {
            peers.demote_to_old(ip);
            true
        } else {
            false
        }
    }
}
