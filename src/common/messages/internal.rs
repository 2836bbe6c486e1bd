use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::common::node::WireNode;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DHTMessage {
    #[serde(rename = "n")]
    pub nonce: ByteBuf,

    #[serde(rename = "s")]
    pub sender: WireNode,

    #[serde(rename = "c")]
    pub command: i64,

    #[serde(rename = "a")]
    pub arguments: Vec<ByteBuf>,
}

impl DHTMessage {
    pub fn from_bytes(bytes: &[u8]) -> Result<DHTMessage, serde_bencode::Error> {
        let obj = serde_bencode::from_bytes(bytes)?;
        Ok(obj)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_bencode::Error> {
        serde_bencode::to_bytes(self)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DHTStoredValue {
    #[serde(rename = "k")]
    pub key: ByteBuf,

    #[serde(rename = "v")]
    pub value: ByteBuf,
}
