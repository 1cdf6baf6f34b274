//! Standalone ring-invariant checker: connect to every node's DHT
//! listener, pull a summary (predecessor/successor/fingers), and verify
//! that the successor/predecessor chain forms a single cycle over the
//! sorted node IDs, and that every finger points at the node actually
//! responsible for its target.
//!
//! Targets one specific ring at a time (`--ring client|data`), since a
//! distorage peer hosts two independent rings behind the same DHT
//! listener, and walks the full 160-bit space with proper wraparound.

use clap::Parser;
use tonic::transport::Channel;
use tonic::Request;

use distorage::rpc::proto::dht_client::DhtClient;
use distorage::rpc::proto::{bytes_to_node_id, DhtPingRequest, NodeSummaryResponse, RegisterDhtRequest};
use distorage::utils::crypto::NodeId;
use distorage::utils::types::DhtId;

#[derive(Debug, Parser)]
#[command(name = "clusterctl", about = "Inspect and validate a running distorage cluster")]
struct Args {
    /// Cluster secret, required to register with each node's DHT listener.
    #[arg(long)]
    secret: String,

    /// Which ring to inspect.
    #[arg(long, value_enum, default_value = "data")]
    ring: RingArg,

    /// DHT addresses (`ip:port`) of every node to inspect.
    #[arg(required = true)]
    addrs: Vec<String>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum RingArg {
    Client,
    Data,
}

impl From<RingArg> for DhtId {
    fn from(r: RingArg) -> DhtId {
        match r {
            RingArg::Client => DhtId::Client,
            RingArg::Data => DhtId::Data,
        }
    }
}

struct NodeView {
    ip: String,
    node_id: NodeId,
    predecessor: Option<String>,
    successor: String,
    fingers: Vec<(NodeId, String)>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let dht_id: DhtId = args.ring.into();

    let mut nodes = Vec::new();
    for addr in &args.addrs {
        match fetch_summary(addr, dht_id, &args.secret).await {
            Ok(view) => nodes.push(view),
            Err(e) => {
                eprintln!("could not reach {addr}: {e}");
                std::process::exit(1);
            }
        }
    }

    nodes.sort_by_key(|n| n.node_id);
    let ids: Vec<NodeId> = nodes.iter().map(|n| n.node_id).collect();

    let mut ok = true;

    for (i, node) in nodes.iter().enumerate() {
        let next = &nodes[(i + 1) % nodes.len()];
        if nodes.len() > 1 && node.successor != next.ip {
            ok = false;
            println!(
                "{} (id {}): successor is {}, expected {} (next on the ring)",
                node.ip, node.node_id, node.successor, next.ip
            );
        }
        if nodes.len() > 1 && next.predecessor.as_deref() != Some(node.ip.as_str()) {
            ok = false;
            println!(
                "{} (id {}): predecessor is {:?}, expected {} (previous on the ring)",
                next.ip, next.node_id, next.predecessor, node.ip
            );
        }
    }

    for node in &nodes {
        for (target, address) in &node.fingers {
            let responsible = responsible_for(*target, &ids);
            let responsible_ip = &nodes[responsible].ip;
            if address != responsible_ip && !address.is_empty() {
                ok = false;
                println!(
                    "{}: finger for target {} points to {}, but {} is responsible",
                    node.ip, target, address, responsible_ip
                );
            }
        }
    }

    if ok {
        println!("ring looks consistent across {} node(s)", nodes.len());
    } else {
        println!("ring is inconsistent");
        std::process::exit(1);
    }
}

/// The node whose ID is the first at or clockwise from `target`, i.e. the
/// Chord successor of `target` among `sorted_ids` (which is already in
/// ascending order since `nodes` was sorted by `node_id`).
fn responsible_for(target: NodeId, sorted_ids: &[NodeId]) -> usize {
    sorted_ids
        .iter()
        .position(|id| *id >= target)
        .unwrap_or(0)
}

async fn fetch_summary(addr: &str, dht_id: DhtId, secret: &str) -> Result<NodeView, Box<dyn std::error::Error>> {
    let endpoint = format!("http://{addr}");
    let mut client: DhtClient<Channel> = DhtClient::connect(endpoint).await?;

    let reg = client
        .register(RegisterDhtRequest { dht_id: dht_id.as_i32(), secret: secret.to_string() })
        .await?
        .into_inner();
    if !reg.ok {
        return Err(format!("registration refused: {}", reg.msg).into());
    }

    let summary: NodeSummaryResponse = client
        .get_summary(Request::new(DhtPingRequest { dht_id: dht_id.as_i32() }))
        .await?
        .into_inner();

    let node_id = bytes_to_node_id(&summary.node_id)?;
    let fingers = summary
        .fingers
        .into_iter()
        .map(|f| Ok((bytes_to_node_id(&f.target)?, f.address)))
        .collect::<Result<Vec<_>, Box<dyn std::error::Error>>>()?;

    Ok(NodeView {
        ip: summary.ip,
        node_id,
        predecessor: summary.predecessor,
        successor: summary.successor,
        fingers,
    })
}
