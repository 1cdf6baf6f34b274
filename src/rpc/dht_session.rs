//! Client-side handle to a remote node's `Dht` service, built on `tonic`'s
//! connection-per-call model: a `Channel` is cheap to clone and reconnects
//! internally, so "acquire" here means "connect", not "keep a long-lived
//! stateful handle". Every request carries `dht_id` so one listener can
//! serve both rings. `acquire` calls `Register(dht_id, secret)` once up
//! front; a mismatched secret fails the acquisition with an `Auth` error
//! before any ring RPC is attempted.

use std::path::PathBuf;
use std::time::Duration;

use tonic::transport::Channel;

use crate::utils::constants::{CONNECTION_MAX_RETRIES, CONNECTION_RETRY_SLEEP_MILLIS, DEFAULT_DHT_PORT};
use crate::utils::crypto::NodeId;
use crate::utils::error::{DistorageError, Result};
use crate::utils::types::{Address, DhtId, ElemValue};

use super::proto::node_id_to_bytes;
use super::proto::{
    dht_client::DhtClient, DhtPingRequest, FindRequest, FindSuccessorRequest, JoinRequest,
    NotifyRequest, RegisterDhtRequest, RemoveRequest, StoreReplicaRequest, StoreRequest,
};

pub struct DhtSession {
    client: DhtClient<Channel>,
    dht_id: DhtId,
}

impl DhtSession {
    /// Connects to `ip`'s DHT listener and registers with `secret`. A
    /// secret mismatch surfaces as `DistorageError::Auth`, before any ring
    /// RPC runs over this session.
    pub async fn acquire(ip: &str, dht_id: DhtId, secret: &str) -> Result<DhtSession> {
        let endpoint = format!("http://{ip}:{DEFAULT_DHT_PORT}");
        let mut last_err = None;
        let mut client = None;
        for attempt in 0..CONNECTION_MAX_RETRIES {
            match DhtClient::connect(endpoint.clone()).await {
                Ok(c) => {
                    client = Some(c);
                    break;
                }
                Err(e) => {
                    last_err = Some(e);
                    if attempt + 1 < CONNECTION_MAX_RETRIES {
                        tokio::time::sleep(Duration::from_millis(CONNECTION_RETRY_SLEEP_MILLIS)).await;
                    }
                }
            }
        }
        let Some(mut client) = client else {
            return Err(DistorageError::Connection(format!(
                "could not connect to {endpoint}: {}",
                last_err.map(|e| e.to_string()).unwrap_or_default()
            )));
        };

        let resp = client
            .register(RegisterDhtRequest { dht_id: dht_id.as_i32(), secret: secret.to_string() })
            .await?
            .into_inner();
        if !resp.ok {
            return Err(DistorageError::Auth(resp.msg));
        }
        Ok(DhtSession { client, dht_id })
    }

    pub async fn find_successor(&self, id: NodeId) -> Result<Address> {
        let mut client = self.client.clone();
        let resp = client
            .find_successor(FindSuccessorRequest {
                dht_id: self.dht_id.as_i32(),
                id: node_id_to_bytes(id),
            })
            .await?
            .into_inner();
        if resp.ok {
            Ok(resp.ip)
        } else {
            Err(DistorageError::Connection(resp.msg))
        }
    }

    pub async fn join(&self, ip: &str) -> Result<Address> {
        let mut client = self.client.clone();
        let resp = client
            .join(JoinRequest {
                dht_id: self.dht_id.as_i32(),
                ip: ip.to_string(),
            })
            .await?
            .into_inner();
        if resp.ok {
            Ok(resp.ip)
        } else {
            Err(DistorageError::Connection(resp.msg))
        }
    }

    pub async fn get_predecessor(&self) -> Result<Option<Address>> {
        let mut client = self.client.clone();
        let resp = client
            .get_predecessor(DhtPingRequest {
                dht_id: self.dht_id.as_i32(),
            })
            .await?
            .into_inner();
        Ok(resp.ip)
    }

    pub async fn notify(&self, ip: &str) -> Result<()> {
        let mut client = self.client.clone();
        client
            .notify(NotifyRequest {
                dht_id: self.dht_id.as_i32(),
                ip: ip.to_string(),
            })
            .await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        let mut client = self.client.clone();
        client
            .ping(DhtPingRequest {
                dht_id: self.dht_id.as_i32(),
            })
            .await?;
        Ok(())
    }

    pub async fn find(&self, key: &str, is_file: bool) -> Result<Option<ElemValue>> {
        let mut client = self.client.clone();
        let resp = client
            .find(FindRequest {
                dht_id: self.dht_id.as_i32(),
                key: key.to_string(),
                is_file,
            })
            .await?
            .into_inner();
        if !resp.ok {
            return Err(DistorageError::Connection(resp.msg));
        }
        match resp.value {
            Some(v) => Ok(Some(v.try_into()?)),
            None => Ok(None),
        }
    }

    pub async fn store(
        &self,
        key: &str,
        value: ElemValue,
        overwrite: bool,
        check_removed: bool,
        persist_path: Option<PathBuf>,
    ) -> Result<()> {
        let mut client = self.client.clone();
        let resp = client
            .store(StoreRequest {
                dht_id: self.dht_id.as_i32(),
                key: key.to_string(),
                value: Some(value.into()),
                overwrite,
                check_removed,
                persist_path: persist_path.map(|p| p.to_string_lossy().into_owned()),
            })
            .await?
            .into_inner();
        if resp.ok {
            Ok(())
        } else {
            Err(DistorageError::Connection(resp.msg))
        }
    }

    pub async fn store_replica(&self, key: &str, value: ElemValue, persist_path: Option<PathBuf>) -> Result<()> {
        let mut client = self.client.clone();
        let resp = client
            .store_replica(StoreReplicaRequest {
                dht_id: self.dht_id.as_i32(),
                key: key.to_string(),
                value: Some(value.into()),
                persist_path: persist_path.map(|p| p.to_string_lossy().into_owned()),
            })
            .await?
            .into_inner();
        if resp.ok {
            Ok(())
        } else {
            Err(DistorageError::Connection(resp.msg))
        }
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        let mut client = self.client.clone();
        let resp = client
            .remove(RemoveRequest {
                dht_id: self.dht_id.as_i32(),
                key: key.to_string(),
            })
            .await?
            .into_inner();
        if resp.ok {
            Ok(())
        } else {
            Err(DistorageError::Connection(resp.msg))
        }
    }

    pub async fn remove_replica(&self, key: &str) -> Result<()> {
        let mut client = self.client.clone();
        let resp = client
            .remove_replica(RemoveRequest {
                dht_id: self.dht_id.as_i32(),
                key: key.to_string(),
            })
            .await?
            .into_inner();
        if resp.ok {
            Ok(())
        } else {
            Err(DistorageError::Connection(resp.msg))
        }
    }
}
