//! Peer-to-peer distributed file storage over two independent Chord
//! rings sharing one peer set: a small "clients" ring for JSON account
//! records and a "data" ring for file bodies.

pub mod cli;
pub mod cluster;
pub mod node;
pub mod rpc;
pub mod utils;
pub mod workers;
