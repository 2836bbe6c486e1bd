use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use ed25519_dalek::SigningKey;

use crate::common::MAX_BUCKET_SIZE_K;
use crate::storage::{Storage, DEFAULT_MAX_KEYWORDS};

use super::transport::Transport;

/// Default request timeout before abandoning a pending request to a non-responding node.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
/// Default number of requests a lookup keeps in flight.
pub const DEFAULT_ALPHA: usize = 3;
/// Default interval between routing table refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);
/// Default age after which a bucket that saw no traffic is stale.
pub const DEFAULT_BUCKET_STALE_AFTER: Duration = Duration::from_secs(60 * 60);
/// Default interval between saves of the node's [super::State].
pub const DEFAULT_SAVE_STATE_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug)]
/// Rpc and Dht configurations
pub struct Config {
    /// Addresses pinged as soon as the node starts, see [super::Rpc::bootstrap].
    ///
    /// Defaults to none.
    pub bootstrap: Vec<SocketAddr>,
    /// Key pair this node's certificate, and thus its [crate::Id], is derived from.
    ///
    /// Defaults to None, where a random key is generated.
    pub signing_key: Option<SigningKey>,
    /// Address to bind the UDP socket to.
    ///
    /// Defaults to `0.0.0.0`
    pub bind_address: IpAddr,
    /// Explicit port to listen on.
    ///
    /// Defaults to None, where the OS picks a free port.
    pub port: Option<u16>,
    /// Address advertised to other nodes in every message we send.
    ///
    /// Defaults to None, where the transport's local address is used.
    pub public_address: Option<SocketAddr>,
    /// Opaque application metadata advertised alongside our contact.
    pub metadata: Bytes,
    /// Request timeout duration, after which a non-responding node is evicted.
    ///
    /// Defaults to [DEFAULT_REQUEST_TIMEOUT]
    pub request_timeout: Duration,
    /// Maximum size of a k-bucket, and the number of nodes returned by FIND_NODE.
    ///
    /// Defaults to [MAX_BUCKET_SIZE_K]
    pub k: usize,
    /// Number of requests each lookup keeps in flight, and of closest contacts
    /// each refresh lookup is sent to.
    ///
    /// Defaults to [DEFAULT_ALPHA]
    pub alpha: usize,
    /// How often [super::Rpc::tick] refreshes stale buckets and republishes stored records.
    ///
    /// Defaults to [DEFAULT_REFRESH_INTERVAL]
    pub refresh_interval: Duration,
    /// Buckets not updated within this duration get a refresh lookup.
    ///
    /// Defaults to [DEFAULT_BUCKET_STALE_AFTER]
    pub bucket_stale_after: Duration,
    /// File the node's [super::State] is saved to every [Config::save_state_interval].
    ///
    /// Defaults to None, where the state is never saved.
    pub state_path: Option<PathBuf>,
    /// Defaults to [DEFAULT_SAVE_STATE_INTERVAL]
    pub save_state_interval: Duration,
    /// Maximum number of keywords held by the default [crate::storage::MemoryStorage].
    ///
    /// Ignored if [Config::storage] is set.
    pub max_keywords: usize,
    /// Storage backend.
    ///
    /// Defaults to None, where a [crate::storage::MemoryStorage] is used.
    pub storage: Option<Box<dyn Storage>>,
    /// Datagram transport.
    ///
    /// Defaults to None, where a [super::transport::UdpTransport] is bound to
    /// [Config::bind_address] and [Config::port].
    pub transport: Option<Box<dyn Transport>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bootstrap: vec![],
            signing_key: None,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: None,
            public_address: None,
            metadata: Bytes::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            k: MAX_BUCKET_SIZE_K,
            alpha: DEFAULT_ALPHA,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            bucket_stale_after: DEFAULT_BUCKET_STALE_AFTER,
            state_path: None,
            save_state_interval: DEFAULT_SAVE_STATE_INTERVAL,
            max_keywords: DEFAULT_MAX_KEYWORDS,
            storage: None,
            transport: None,
        }
    }
}
