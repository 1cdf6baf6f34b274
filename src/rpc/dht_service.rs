//! Server side of the `Dht` service: dispatches each request to whichever
//! ring (`clients` or `data`) its `dht_id` names and translates
//! [`ChordNode`] results into the uniform `(data, ok, msg)` triples.

use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::cluster::ClusterContext;
use crate::node::ChordNode;
use crate::utils::types::DhtId;

use super::proto::dht_server::Dht;
use super::proto::{
    bytes_to_node_id, node_id_to_bytes, DhtPingRequest, Empty, FindRequest, FindResponse,
    FindSuccessorRequest, FindSuccessorResponse, FingerEntryMsg, GetPredecessorResponse,
    JoinRequest, JoinResponse, NodeSummaryResponse, NotifyRequest, RegisterDhtRequest,
    RegisterResponse, RemoveRequest, RemoveResponse, StoreReplicaRequest, StoreRequest,
    StoreResponse,
};

pub struct DhtServiceImpl {
    cluster: Arc<ClusterContext>,
}

impl DhtServiceImpl {
    pub fn new(cluster: Arc<ClusterContext>) -> Self {
        DhtServiceImpl { cluster }
    }

    fn ring(&self, dht_id: i32) -> Result<&ChordNode, Status> {
        DhtId::from_i32(dht_id)
            .map(|id| self.cluster.ring(id))
            .ok_or_else(|| Status::invalid_argument("unknown dht_id"))
    }
}

#[tonic::async_trait]
impl Dht for DhtServiceImpl {
    async fn register(
        &self,
        request: Request<RegisterDhtRequest>,
    ) -> Result<Response<RegisterResponse>, Status> {
        let req = request.into_inner();
        self.ring(req.dht_id)?;
        if req.secret != self.cluster.config.secret {
            return Ok(Response::new(RegisterResponse {
                ok: false,
                msg: "cluster secret mismatch".to_string(),
            }));
        }
        Ok(Response::new(RegisterResponse { ok: true, msg: String::new() }))
    }

    async fn get_summary(
        &self,
        request: Request<DhtPingRequest>,
    ) -> Result<Response<NodeSummaryResponse>, Status> {
        let req = request.into_inner();
        let node = self.ring(req.dht_id)?;
        let summary = node.summary();
        let fingers = node
            .finger_snapshot()
            .into_iter()
            .map(|(target, address)| FingerEntryMsg { target: node_id_to_bytes(target), address })
            .collect();
        Ok(Response::new(NodeSummaryResponse {
            ip: summary.ip,
            node_id: node_id_to_bytes(summary.node_id),
            predecessor: summary.predecessor,
            successor: summary.successor,
            elems_count: summary.elems_count as u64,
            repl_elems_count: summary.repl_elems_count as u64,
            removed_elems_count: summary.removed_elems_count as u64,
            fingers,
        }))
    }

    async fn join(&self, request: Request<JoinRequest>) -> Result<Response<JoinResponse>, Status> {
        let req = request.into_inner();
        let node = self.ring(req.dht_id)?;
        let resp = match node.handle_join(&req.ip).await {
            Ok(ip) => JoinResponse { ip, ok: true, msg: String::new() },
            Err(e) => JoinResponse { ip: String::new(), ok: e.is_benign_ok(), msg: e.as_msg() },
        };
        Ok(Response::new(resp))
    }

    async fn find_successor(
        &self,
        request: Request<FindSuccessorRequest>,
    ) -> Result<Response<FindSuccessorResponse>, Status> {
        let req = request.into_inner();
        let node = self.ring(req.dht_id)?;
        let id = bytes_to_node_id(&req.id)?;
        let resp = match node.find_successor(id).await {
            Ok(ip) => FindSuccessorResponse { ip, ok: true, msg: String::new() },
            Err(e) => FindSuccessorResponse { ip: String::new(), ok: e.is_benign_ok(), msg: e.as_msg() },
        };
        Ok(Response::new(resp))
    }

    async fn get_predecessor(
        &self,
        request: Request<DhtPingRequest>,
    ) -> Result<Response<GetPredecessorResponse>, Status> {
        let req = request.into_inner();
        let node = self.ring(req.dht_id)?;
        Ok(Response::new(GetPredecessorResponse { ip: node.predecessor() }))
    }

    async fn notify(&self, request: Request<NotifyRequest>) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        let node = self.ring(req.dht_id)?;
        node.notify(&req.ip).await;
        Ok(Response::new(Empty {}))
    }

    async fn find(&self, request: Request<FindRequest>) -> Result<Response<FindResponse>, Status> {
        let req = request.into_inner();
        let node = self.ring(req.dht_id)?;
        let resp = match node.find(&req.key, req.is_file).await {
            Ok(value) => FindResponse { value: value.map(Into::into), ok: true, msg: String::new() },
            Err(e) => FindResponse { value: None, ok: e.is_benign_ok(), msg: e.as_msg() },
        };
        Ok(Response::new(resp))
    }

    async fn store(&self, request: Request<StoreRequest>) -> Result<Response<StoreResponse>, Status> {
        let req = request.into_inner();
        let node = self.ring(req.dht_id)?;
        let value = req.value.ok_or_else(|| Status::invalid_argument("missing value"))?.try_into()?;
        let resp = match node
            .store(&req.key, value, req.overwrite, req.check_removed, req.persist_path.map(Into::into))
            .await
        {
            Ok(()) => StoreResponse { ok: true, msg: String::new() },
            Err(e) => StoreResponse { ok: e.is_benign_ok(), msg: e.as_msg() },
        };
        Ok(Response::new(resp))
    }

    async fn store_replica(
        &self,
        request: Request<StoreReplicaRequest>,
    ) -> Result<Response<StoreResponse>, Status> {
        let req = request.into_inner();
        let node = self.ring(req.dht_id)?;
        let value = req.value.ok_or_else(|| Status::invalid_argument("missing value"))?.try_into()?;
        let resp = match node.store_replica(&req.key, value, req.persist_path.map(Into::into)).await {
            Ok(()) => StoreResponse { ok: true, msg: String::new() },
            Err(e) => StoreResponse { ok: e.is_benign_ok(), msg: e.as_msg() },
        };
        Ok(Response::new(resp))
    }

    async fn remove(&self, request: Request<RemoveRequest>) -> Result<Response<RemoveResponse>, Status> {
        let req = request.into_inner();
        let node = self.ring(req.dht_id)?;
        let resp = match node.remove(&req.key).await {
            Ok(()) => RemoveResponse { ok: true, msg: String::new() },
            Err(e) => RemoveResponse { ok: e.is_benign_ok(), msg: e.as_msg() },
        };
        Ok(Response::new(resp))
    }

    async fn remove_replica(
        &self,
        request: Request<RemoveRequest>,
    ) -> Result<Response<RemoveResponse>, Status> {
        let req = request.into_inner();
        let node = self.ring(req.dht_id)?;
        let resp = match node.remove_replica(&req.key).await {
            Ok(()) => RemoveResponse { ok: true, msg: String::new() },
            Err(e) => RemoveResponse { ok: e.is_benign_ok(), msg: e.as_msg() },
        };
        Ok(Response::new(resp))
    }

    async fn ping(&self, request: Request<DhtPingRequest>) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        self.ring(req.dht_id)?;
        Ok(Response::new(Empty {}))
    }
}
