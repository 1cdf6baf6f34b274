//! Multi-node convergence scenarios: two-node join, key migration on
//! join, and predecessor failure promoting replicas.
//!
//! Each "node" is a real `tonic` `Dht` listener bound to its own loopback
//! address (127.0.0.x); `ChordNode::find_successor`/`stabilize`/`notify`
//! route over real `DhtSession` RPCs, same as in production — there is no
//! mock transport seam in this crate, so exercising convergence means
//! standing up real listeners rather than wiring two `ChordNode`s
//! together in-process.

use std::sync::Arc;
use std::time::Duration;

use tonic::transport::Server;

use distorage::cluster::ClusterContext;
use distorage::rpc::dht_service::DhtServiceImpl;
use distorage::rpc::DhtServer;
use distorage::utils::config::Config;
use distorage::utils::types::{DhtId, ElemValue};

const SECRET: &str = "integration-test-secret";

async fn spawn_peer(ip: &str) -> (Arc<ClusterContext>, tokio::task::JoinHandle<()>) {
    let data_dir = std::env::temp_dir().join(format!("distorage-it-{}", ip.replace('.', "-")));
    let config = Config::new(ip.to_string(), SECRET.to_string(), data_dir);
    let cluster = Arc::new(ClusterContext::new(config));

    let dht_addr = cluster.config.dht_address();
    let serve_cluster = cluster.clone();
    let handle = tokio::spawn(async move {
        let service = DhtServer::new(DhtServiceImpl::new(serve_cluster));
        let _ = Server::builder()
            .add_service(service)
            .serve(dht_addr.parse().unwrap())
            .await;
    });

    // Give the listener a moment to bind before any RPC targets it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    (cluster, handle)
}

#[tokio::test]
async fn two_node_join_converges() {
    let (a, _a_handle) = spawn_peer("127.0.0.11").await;
    let (b, _b_handle) = spawn_peer("127.0.0.12").await;

    b.ring(DhtId::Data).join_cluster(&a.host_ip()).await.unwrap();

    // One stabilize tick each.
    a.ring(DhtId::Data).stabilize().await;
    b.ring(DhtId::Data).stabilize().await;

    assert_eq!(a.ring(DhtId::Data).successor(), b.host_ip());
    assert_eq!(b.ring(DhtId::Data).successor(), a.host_ip());
    assert_eq!(a.ring(DhtId::Data).predecessor(), Some(b.host_ip()));
    assert_eq!(b.ring(DhtId::Data).predecessor(), Some(a.host_ip()));
}

#[tokio::test]
async fn key_migration_on_join() {
    let (a, _a_handle) = spawn_peer("127.0.0.21").await;

    for i in 0..10u8 {
        a.ring(DhtId::Data)
            .store(&format!("k{i}"), ElemValue::Bytes(vec![i]), true, false, None)
            .await
            .unwrap();
    }

    let (b, _b_handle) = spawn_peer("127.0.0.22").await;
    b.ring(DhtId::Data).join_cluster(&a.host_ip()).await.unwrap();
    a.ring(DhtId::Data).stabilize().await;
    b.ring(DhtId::Data).stabilize().await;

    // Every key is findable through either peer, and lives at exactly one
    // primary (found on whichever of a/b is NOT serving it as a replica
    // fast-path — we only assert the value round-trips from both peers).
    for i in 0..10u8 {
        let key = format!("k{i}");
        let via_a = a.ring(DhtId::Data).find(&key, false).await.unwrap();
        let via_b = b.ring(DhtId::Data).find(&key, false).await.unwrap();
        assert_eq!(via_a, Some(ElemValue::Bytes(vec![i])));
        assert_eq!(via_b, Some(ElemValue::Bytes(vec![i])));
    }
}

#[tokio::test]
async fn predecessor_failure_promotes_replicas() {
    let (a, a_handle) = spawn_peer("127.0.0.41").await;
    let (b, _b_handle) = spawn_peer("127.0.0.42").await;

    b.ring(DhtId::Data).join_cluster(&a.host_ip()).await.unwrap();
    a.ring(DhtId::Data).stabilize().await;
    b.ring(DhtId::Data).stabilize().await;
    assert_eq!(b.ring(DhtId::Data).predecessor(), Some(a.host_ip()));

    // Stand in for keys `a` would have replicated to `b` as `a`'s
    // primary-held data (store_replica is exactly what a primary's store()
    // calls on its successor).
    b.ring(DhtId::Data)
        .store_replica("r0", ElemValue::Bytes(b"v0".to_vec()), None)
        .await
        .unwrap();
    b.ring(DhtId::Data)
        .store_replica("r1", ElemValue::Bytes(b"v1".to_vec()), None)
        .await
        .unwrap();
    assert_eq!(b.ring(DhtId::Data).summary().repl_elems_count, 2);

    a_handle.abort();
    tokio::time::sleep(Duration::from_millis(50)).await;

    b.ring(DhtId::Data).check_predecessor().await;
    assert_eq!(b.ring(DhtId::Data).predecessor(), None);
    let summary = b.ring(DhtId::Data).summary();
    assert_eq!(summary.repl_elems_count, 0);
    assert_eq!(summary.elems_count, 2);

    // The ring is now effectively single-node; the next stabilize notices
    // the dead successor and resets it to self.
    b.ring(DhtId::Data).stabilize().await;
    assert_eq!(b.ring(DhtId::Data).successor(), b.host_ip());

    assert_eq!(
        b.ring(DhtId::Data).find("r0", false).await.unwrap(),
        Some(ElemValue::Bytes(b"v0".to_vec()))
    );
    assert_eq!(
        b.ring(DhtId::Data).find("r1", false).await.unwrap(),
        Some(ElemValue::Bytes(b"v1".to_vec()))
    );
}
