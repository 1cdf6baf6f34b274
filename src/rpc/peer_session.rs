//! Client-side handle to a remote node's `PeerControl` service: connect,
//! register with the cluster secret, and pull its known-peer list.

use std::time::Duration;

use tonic::transport::Channel;

use crate::utils::constants::{CONNECTION_MAX_RETRIES, CONNECTION_RETRY_SLEEP_MILLIS, DEFAULT_SERVER_PORT};
use crate::utils::error::{DistorageError, Result};
use crate::utils::types::Address;

use super::proto::{peer_control_client::PeerControlClient, Empty, RegisterPeerRequest};

pub struct PeerSession {
    client: PeerControlClient<Channel>,
}

impl PeerSession {
    pub async fn connect(ip: &str) -> Result<PeerSession> {
        let endpoint = format!("http://{ip}:{DEFAULT_SERVER_PORT}");
        let mut last_err = None;
        for attempt in 0..CONNECTION_MAX_RETRIES {
            match PeerControlClient::connect(endpoint.clone()).await {
                Ok(client) => return Ok(PeerSession { client }),
                Err(e) => {
                    last_err = Some(e);
                    if attempt + 1 < CONNECTION_MAX_RETRIES {
                        tokio::time::sleep(Duration::from_millis(CONNECTION_RETRY_SLEEP_MILLIS)).await;
                    }
                }
            }
        }
        Err(DistorageError::Connection(format!(
            "could not connect to {endpoint}: {}",
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Quick reachability probe used by the local-subnet discovery sweep:
    /// a connection attempt alone (no RPC) is enough to know a host is
    /// running a distorage peer-control listener.
    pub async fn probe(ip: &str) -> bool {
        Self::connect(ip).await.is_ok()
    }

    pub async fn register(&self, my_ip: &str, secret: &str) -> Result<()> {
        let mut client = self.client.clone();
        let resp = client
            .register(RegisterPeerRequest {
                ip: my_ip.to_string(),
                secret: secret.to_string(),
            })
            .await?
            .into_inner();
        if resp.ok {
            Ok(())
        } else {
            Err(DistorageError::Auth(resp.msg))
        }
    }

    pub async fn known_servers(&self) -> Result<Vec<Address>> {
        let mut client = self.client.clone();
        let resp = client.get_known_servers(Empty {}).await?.into_inner();
        Ok(resp.ips)
    }
}
