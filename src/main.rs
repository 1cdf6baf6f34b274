use std::io::{self, Write};
use std::net::UdpSocket;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{info, warn, LevelFilter};
use tonic::transport::Server;

use distorage::cli::{Cli, Command, ServerAction};
use distorage::cluster::ClusterContext;
use distorage::rpc::client_service::ClientServiceImpl;
use distorage::rpc::dht_service::DhtServiceImpl;
use distorage::rpc::peer_service::PeerServiceImpl;
use distorage::rpc::{ClientApiServer, DhtServer, PeerControlServer};
use distorage::rpc::peer_session::PeerSession;
use distorage::rpc::proto::{ClientAuthRequest, DownloadRequest, ListFilesRequest, UploadRequest};
use distorage::rpc::proto::client_api_client::ClientApiClient;
use distorage::utils::config::Config;
use distorage::utils::net::local_subnet_ips;
use distorage::utils::types::DhtId;
use distorage::workers;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    simple_logger::SimpleLogger::new().env().with_level(LevelFilter::Info).init().ok();

    let cli = Cli::parse();
    match cli.command {
        Command::Server { action } => run_server(action).await,
        Command::Client { server } => run_client(server).await,
    }
}

fn detect_host_ip() -> io::Result<String> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect("8.8.8.8:80")?;
    Ok(socket.local_addr()?.ip().to_string())
}

fn prompt_secret() -> String {
    print!("cluster secret: ");
    io::stdout().flush().ok();
    let mut line = String::new();
    io::stdin().read_line(&mut line).ok();
    line.trim().to_string()
}

async fn run_server(action: ServerAction) -> Result<(), Box<dyn std::error::Error>> {
    let host_ip = detect_host_ip()?;
    info!("detected host ip {host_ip}");

    let (secret, bootstrap, discover) = match action {
        ServerAction::New { secret } => (secret.unwrap_or_else(prompt_secret), None, false),
        ServerAction::Connect { ip, secret } => (secret.unwrap_or_else(prompt_secret), Some(ip), false),
        ServerAction::Discover { secret } => (secret.unwrap_or_else(prompt_secret), None, true),
    };

    let data_dir = PathBuf::from("./distorage-data");
    let config = Config::new(host_ip.clone(), secret.clone(), data_dir);
    let cluster = Arc::new(ClusterContext::new(config));

    spawn_listener(cluster.clone());

    if let Some(bootstrap_ip) = bootstrap {
        join_existing_cluster(&cluster, &bootstrap_ip).await;
    } else if discover {
        discover_and_join(&cluster).await;
    }

    cluster.mark_started();
    let worker_handles = workers::spawn_all(cluster.clone());

    for handle in worker_handles {
        handle.await?;
    }
    Ok(())
}

fn spawn_listener(cluster: Arc<ClusterContext>) {
    let server_addr = cluster.config.server_address();
    let peer_cluster = cluster.clone();
    tokio::spawn(async move {
        info!("peer-control listener starting on {server_addr}");
        let service = PeerControlServer::new(PeerServiceImpl::new(peer_cluster));
        if let Err(e) = Server::builder().add_service(service).serve(server_addr.parse().unwrap()).await {
            warn!("peer-control listener stopped: {e}");
        }
    });

    let dht_addr = cluster.config.dht_address();
    let dht_cluster = cluster.clone();
    tokio::spawn(async move {
        info!("dht listener starting on {dht_addr}");
        let service = DhtServer::new(DhtServiceImpl::new(dht_cluster));
        if let Err(e) = Server::builder().add_service(service).serve(dht_addr.parse().unwrap()).await {
            warn!("dht listener stopped: {e}");
        }
    });

    let client_addr = cluster.config.client_address();
    tokio::spawn(async move {
        info!("client-api listener starting on {client_addr}");
        let service = ClientApiServer::new(ClientServiceImpl::new(cluster));
        if let Err(e) = Server::builder().add_service(service).serve(client_addr.parse().unwrap()).await {
            warn!("client-api listener stopped: {e}");
        }
    });
}

async fn join_existing_cluster(cluster: &Arc<ClusterContext>, bootstrap_ip: &str) {
    match PeerSession::connect(bootstrap_ip).await {
        Ok(session) => {
            if let Err(e) = session.register(&cluster.host_ip(), &cluster.config.secret).await {
                warn!("registration with {bootstrap_ip} failed: {e}");
                return;
            }
            cluster.add_peer(bootstrap_ip);
            if let Ok(peers) = session.known_servers().await {
                for ip in peers {
                    cluster.add_peer(&ip);
                }
            }
        }
        Err(e) => {
            warn!("could not reach {bootstrap_ip}: {e}");
            return;
        }
    }

    for dht_id in [DhtId::Client, DhtId::Data] {
        let node = cluster.ring(dht_id);
        if let Err(e) = node.join_cluster(bootstrap_ip).await {
            warn!("join of {:?} ring via {bootstrap_ip} failed: {e}", dht_id);
        }
    }
}

async fn discover_and_join(cluster: &Arc<ClusterContext>) {
    for ip in local_subnet_ips(&cluster.host_ip()) {
        if PeerSession::probe(&ip).await {
            info!("found existing cluster member at {ip}, joining");
            join_existing_cluster(cluster, &ip).await;
            return;
        }
    }
    info!("no existing cluster found on the local subnet, starting a new one");
}

async fn run_client(server: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let server_ip = match server {
        Some(ip) => ip,
        None => {
            let self_ip = detect_host_ip()?;
            let mut found = None;
            for ip in local_subnet_ips(&self_ip) {
                if PeerSession::probe(&ip).await {
                    found = Some(ip);
                    break;
                }
            }
            found.ok_or("no distorage server found on the local subnet")?
        }
    };

    let endpoint = format!("http://{server_ip}:{}", distorage::utils::constants::DEFAULT_CLIENT_PORT);
    let mut client = ClientApiClient::connect(endpoint).await?;
    println!("connected to {server_ip}. commands: register, login, upload <path>, download <path>, list, quit");

    let mut username = String::new();
    let mut password = String::new();

    loop {
        print!("> ");
        io::stdout().flush().ok();
        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let mut parts = line.trim().split_whitespace();
        match parts.next() {
            Some("register") | Some("login") => {
                print!("username: ");
                io::stdout().flush().ok();
                let mut u = String::new();
                io::stdin().read_line(&mut u)?;
                username = u.trim().to_string();
                password = prompt_secret();
                let req = ClientAuthRequest { username: username.clone(), password: password.clone() };
                let resp = if line.trim() == "register" {
                    client.register(req).await?.into_inner()
                } else {
                    client.login(req).await?.into_inner()
                };
                println!("ok={} msg={}", resp.ok, resp.msg);
            }
            Some("upload") => {
                let Some(path) = parts.next() else {
                    println!("usage: upload <path>");
                    continue;
                };
                let content = std::fs::read(path).unwrap_or_default();
                let resp = client
                    .upload(UploadRequest {
                        username: username.clone(),
                        password: password.clone(),
                        path: path.to_string(),
                        content,
                    })
                    .await?
                    .into_inner();
                println!("ok={} msg={}", resp.ok, resp.msg);
            }
            Some("download") => {
                let Some(path) = parts.next() else {
                    println!("usage: download <path>");
                    continue;
                };
                let resp = client
                    .download(DownloadRequest { username: username.clone(), password: password.clone(), path: path.to_string() })
                    .await?
                    .into_inner();
                if resp.ok {
                    std::fs::write(path, resp.content)?;
                    println!("saved {path}");
                } else {
                    println!("error: {}", resp.msg);
                }
            }
            Some("list") => {
                let resp = client
                    .list_files(ListFilesRequest { username: username.clone(), password: password.clone() })
                    .await?
                    .into_inner();
                for f in resp.files {
                    println!("{f}");
                }
            }
            Some("quit") | None => break,
            Some(other) => println!("unknown command: {other}"),
        }
    }
    Ok(())
}
