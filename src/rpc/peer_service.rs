//! Server side of `PeerControl`: cluster admission (secret check, `known`
//! membership) and the known-peers list used by the local-subnet
//! discovery sweep.

use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::cluster::ClusterContext;

use super::proto::peer_control_server::PeerControl;
use super::proto::{Empty, KnownServersResponse, RegisterPeerRequest, RegisterResponse};

pub struct PeerServiceImpl {
    cluster: Arc<ClusterContext>,
}

impl PeerServiceImpl {
    pub fn new(cluster: Arc<ClusterContext>) -> Self {
        PeerServiceImpl { cluster }
    }
}

#[tonic::async_trait]
impl PeerControl for PeerServiceImpl {
    async fn register(
        &self,
        request: Request<RegisterPeerRequest>,
    ) -> Result<Response<RegisterResponse>, Status> {
        let req = request.into_inner();
        // Accept on a matching secret, or on a secret mismatch if the caller
        // is already a known member — a peer that legitimately joined earlier
        // shouldn't get locked out by a later secret typo.
        if req.secret != self.cluster.config.secret && !self.cluster.is_known_peer(&req.ip) {
            return Ok(Response::new(RegisterResponse {
                ok: false,
                msg: "cluster secret mismatch".to_string(),
            }));
        }
        self.cluster.add_peer(&req.ip);
        Ok(Response::new(RegisterResponse { ok: true, msg: String::new() }))
    }

    async fn get_known_servers(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<KnownServersResponse>, Status> {
        let mut ips = self.cluster.known_peers();
        ips.push(self.cluster.host_ip());
        Ok(Response::new(KnownServersResponse { ips }))
    }
}
