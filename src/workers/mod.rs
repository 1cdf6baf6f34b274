//! The nine background maintenance loops: `stabilize`, `fix_fingers` and
//! `check_predecessor` run independently per ring (six loops), plus
//! cluster-wide peer discovery, a stale-peer sweep, and successor repair.
//! Each is an independent `tokio::spawn`ed loop; a single failed tick logs
//! and the loop continues rather than terminating.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::sleep;

use crate::cluster::ClusterContext;
use crate::rpc::peer_session::PeerSession;
use crate::utils::constants::{
    CHECK_OLD_SERVERS_INTERVAL, DHT_CHECK_PREDECESSOR_INTERVAL, DHT_CHECK_SUCCESSOR_INTERVAL,
    DHT_FIX_FINGERS_INTERVAL, DHT_STABILIZE_INTERVAL, DISCOVER_INTERVAL,
};
use crate::utils::net::is_valid_ipv4;
use crate::utils::types::DhtId;

/// Spawns all nine workers and returns their join handles.
pub fn spawn_all(cluster: Arc<ClusterContext>) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    for dht_id in [DhtId::Client, DhtId::Data] {
        handles.push(tokio::spawn(run_stabilize(cluster.clone(), dht_id)));
        handles.push(tokio::spawn(run_fix_fingers(cluster.clone(), dht_id)));
        handles.push(tokio::spawn(run_check_predecessor(cluster.clone(), dht_id)));
    }

    handles.push(tokio::spawn(run_discovery(cluster.clone())));
    handles.push(tokio::spawn(run_stale_sweep(cluster.clone())));
    handles.push(tokio::spawn(run_successor_repair(cluster)));

    handles
}

fn ring_label(dht_id: DhtId) -> &'static str {
    match dht_id {
        DhtId::Client => "clients",
        DhtId::Data => "data",
    }
}

async fn run_stabilize(cluster: Arc<ClusterContext>, dht_id: DhtId) {
    info!("stabilize[{}] loop starting", ring_label(dht_id));
    loop {
        sleep(DHT_STABILIZE_INTERVAL).await;
        cluster.ring(dht_id).stabilize().await;
    }
}

async fn run_fix_fingers(cluster: Arc<ClusterContext>, dht_id: DhtId) {
    info!("fix_fingers[{}] loop starting", ring_label(dht_id));
    loop {
        sleep(DHT_FIX_FINGERS_INTERVAL).await;
        cluster.ring(dht_id).fix_fingers().await;
    }
}

async fn run_check_predecessor(cluster: Arc<ClusterContext>, dht_id: DhtId) {
    info!("check_predecessor[{}] loop starting", ring_label(dht_id));
    loop {
        sleep(DHT_CHECK_PREDECESSOR_INTERVAL).await;
        cluster.ring(dht_id).check_predecessor().await;
    }
}

/// Membership gossip: for each known peer not timed out, pull its known
/// set and add every entry to ours. A peer's own known-set response
/// always includes its own IP (see `PeerServiceImpl::get_known_servers`),
/// so a successful round trip here also refreshes that peer's
/// `last_active` via `add_peer` — this is what keeps a still-live peer
/// out of `check_timeout`'s reach between discovery ticks.
async fn run_discovery(cluster: Arc<ClusterContext>) {
    info!("discovery loop starting");
    loop {
        sleep(DISCOVER_INTERVAL).await;
        if !cluster.is_started() {
            continue;
        }
        for ip in cluster.known_peers() {
            if cluster.check_timeout(&ip) {
                debug!("discovery: {ip} timed out, skipping this tick");
                continue;
            }
            let session = match PeerSession::connect(&ip).await {
                Ok(s) => s,
                Err(e) => {
                    debug!("discovery: connect to {ip} failed: {e}");
                    continue;
                }
            };
            match session.known_servers().await {
                Ok(peers) => {
                    for peer in peers {
                        cluster.add_peer(&peer);
                    }
                }
                Err(e) => debug!("discovery: known_servers from {ip} failed: {e}"),
            }
        }
    }
}

/// Re-probes peers that fell into the `old` bucket; promotes them back to
/// `known` if they respond again.
async fn run_stale_sweep(cluster: Arc<ClusterContext>) {
    info!("stale-peer sweep loop starting");
    loop {
        sleep(CHECK_OLD_SERVERS_INTERVAL).await;
        for ip in cluster.known_peers() {
            cluster.check_timeout(&ip);
        }
        for ip in cluster.old_peers() {
            if PeerSession::probe(&ip).await {
                info!("peer {ip} reachable again, promoting from old");
                cluster.promote_peer(&ip);
            }
        }
    }
}

/// If a ring's successor still equals self while other peers are known,
/// the ring never actually joined the cluster (or fell back to itself
/// after every other repair path gave up) — force a fresh `join` through
/// each known peer in turn until one hands back a usable IP.
async fn run_successor_repair(cluster: Arc<ClusterContext>) {
    info!("successor-repair loop starting");
    loop {
        sleep(DHT_CHECK_SUCCESSOR_INTERVAL).await;
        for dht_id in [DhtId::Client, DhtId::Data] {
            let node = cluster.ring(dht_id);
            if node.successor() != node.ip {
                continue;
            }
            let known = cluster.known_peers();
            if known.is_empty() {
                continue;
            }
            warn!("{} ring still self-successor with known peers present, attempting rejoin", ring_label(dht_id));
            for bootstrap in known {
                if node.join_cluster(&bootstrap).await.is_ok() && is_valid_ipv4(&node.successor()) {
                    info!("rejoined {} ring via {bootstrap}", ring_label(dht_id));
                    break;
                }
            }
        }
    }
}
