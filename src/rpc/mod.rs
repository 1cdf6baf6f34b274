//! The three-service RPC surface: `PeerControl` (cluster membership),
//! `Dht` (one channel per ring, disambiguated by `dht_id`), and
//! `ClientApi` (account/file operations). Explicit `tonic`/`prost` schemas
//! rather than a reflection-based RPC setup.

pub mod proto;

pub mod client_service;
pub mod dht_service;
pub mod peer_service;

pub mod dht_session;
pub mod peer_session;

pub use proto::{
    client_api_client::ClientApiClient, client_api_server::ClientApiServer, dht_client::DhtClient,
    dht_server::DhtServer, peer_control_client::PeerControlClient,
    peer_control_server::PeerControlServer,
};
