//! Node state persisted across restarts.

use std::net::SocketAddr;
use std::path::Path;

use bytes::Bytes;
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::{Error, Result};

use super::Config;

#[derive(Debug, Clone)]
/// Everything needed to restart a node with the same identity, and
/// rejoin the network through the neighbours it knew.
pub struct State {
    signing_key: SigningKey,
    k: usize,
    alpha: usize,
    metadata: Bytes,
    neighbours: Vec<SocketAddr>,
}

impl State {
    pub(crate) fn new(
        signing_key: SigningKey,
        k: usize,
        alpha: usize,
        metadata: Bytes,
        neighbours: Vec<SocketAddr>,
    ) -> Self {
        Self {
            signing_key,
            k,
            alpha,
            metadata,
            neighbours,
        }
    }

    // === Getters ===

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Addresses of the closest contacts to our own id, to bootstrap from.
    pub fn neighbours(&self) -> &[SocketAddr] {
        &self.neighbours
    }

    // === Public Methods ===

    /// Apply this state to a [Config]: same key pair, parameters and metadata,
    /// bootstrapping from the saved neighbours.
    pub fn configure(self, config: Config) -> Config {
        Config {
            signing_key: Some(self.signing_key),
            k: self.k,
            alpha: self.alpha,
            metadata: self.metadata,
            bootstrap: self.neighbours,
            ..config
        }
    }

    /// Write this state to a file, replacing it.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_bytes()?)?;

        Ok(())
    }

    /// Read a state written by [State::save].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<State> {
        State::from_bytes(std::fs::read(path)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_bencode::to_bytes(&WireState {
            signing_key: ByteBuf::from(self.signing_key.to_bytes().to_vec()),
            k: self.k as u64,
            alpha: self.alpha as u64,
            metadata: ByteBuf::from(self.metadata.to_vec()),
            neighbours: self.neighbours.iter().map(|a| a.to_string()).collect(),
        })?)
    }

    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<State> {
        let wire: WireState = serde_bencode::from_bytes(bytes.as_ref())?;

        let secret: [u8; 32] = wire
            .signing_key
            .as_slice()
            .try_into()
            .map_err(|_| Error::InvalidState("signing key is not 32 bytes".to_string()))?;

        let neighbours = wire
            .neighbours
            .iter()
            .map(|address| {
                address
                    .parse()
                    .map_err(|_| Error::InvalidAddress(address.clone()))
            })
            .collect::<Result<_>>()?;

        Ok(State {
            signing_key: SigningKey::from_bytes(&secret),
            k: wire.k as usize,
            alpha: wire.alpha as usize,
            metadata: wire.metadata.into_vec().into(),
            neighbours,
        })
    }
}

#[derive(Serialize, Deserialize, Debug)]
struct WireState {
    #[serde(rename = "s")]
    signing_key: ByteBuf,

    #[serde(rename = "k")]
    k: u64,

    #[serde(rename = "a")]
    alpha: u64,

    #[serde(rename = "m")]
    metadata: ByteBuf,

    #[serde(rename = "n")]
    neighbours: Vec<String>,
}
