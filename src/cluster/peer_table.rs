//! The membership table: a `known` bucket (candidates for communication)
//! and an `old` bucket (previously dropped, re-probed periodically), with
//! the invariant that a peer is never in both.

use std::collections::HashMap;
use std::time::Instant;

use crate::utils::types::Address;

#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub last_active: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct PeerTable {
    known: HashMap<Address, PeerInfo>,
    old: HashMap<Address, PeerInfo>,
}

impl PeerTable {
    pub fn new() -> Self {
        PeerTable::default()
    }

    /// Adds `ip` to `known`, bumping `last_active`. Removes it from `old`
    /// first so the two buckets stay disjoint.
    pub fn mark_known(&mut self, ip: &Address) {
        self.old.remove(ip);
        self.known
            .entry(ip.clone())
            .or_insert(PeerInfo { last_active: None })
            .last_active = Some(Instant::now());
    }

    /// Moves `ip` from `known` to `old` (e.g. a discovery timeout).
    pub fn demote_to_old(&mut self, ip: &Address) {
        if let Some(info) = self.known.remove(ip) {
            self.old.insert(ip.clone(), info);
        }
    }

    /// Moves `ip` back from `old` to `known` (a stale-peer sweep reached it).
    pub fn promote_from_old(&mut self, ip: &Address) {
        if self.old.remove(ip).is_some() {
            self.mark_known(ip);
        }
    }

    pub fn known_ips(&self) -> Vec<Address> {
        self.known.keys().cloned().collect()
    }

    pub fn old_ips(&self) -> Vec<Address> {
        self.old.keys().cloned().collect()
    }

    pub fn is_known(&self, ip: &Address) -> bool {
        self.known.contains_key(ip)
    }

    pub fn last_active(&self, ip: &Address) -> Option<Instant> {
        self.known.get(ip).and_then(|i| i.last_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_in_both_buckets() {
        let mut table = PeerTable::new();
        let ip = "10.0.0.2:7100".to_string();
        table.mark_known(&ip);
        assert!(table.is_known(&ip));
        table.demote_to_old(&ip);
        assert!(!table.is_known(&ip));
        assert!(table.old_ips().contains(&ip));
        table.promote_from_old(&ip);
        assert!(table.is_known(&ip));
        assert!(!table.old_ips().contains(&ip));
    }
}
