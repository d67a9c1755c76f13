//! Stakeflow adapters
//!
//! Concrete implementations of the core seams:
//!
//! - `JsonRpcTransport`: `ChainTransport` over HTTP JSON-RPC against a node that holds
//!   the signing accounts
//! - `FileStore`: `KeyValueStore` backed by one JSON file per key
//! - `validate_rpc_url`: endpoint policy applied before any request leaves the process

pub mod egress;
pub mod rpc;
pub mod storage;

pub use egress::validate_rpc_url;
pub use rpc::JsonRpcTransport;
pub use storage::FileStore;
