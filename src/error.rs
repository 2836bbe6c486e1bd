//! Main Crate Error

#[derive(thiserror::Error, Debug)]
/// Kadrpc crate error enum.
pub enum Error {
    #[error(transparent)]
    /// Transparent [std::io::Error]
    IO(#[from] std::io::Error),

    #[error("Failed to parse packet bytes: {0}")]
    BencodeError(#[from] serde_bencode::Error),

    /// Indicates that an [crate::Id] was built from the wrong number of bytes.
    #[error("Invalid Id size, expected 20, got {0}")]
    InvalidIdSize(usize),

    /// Indicates that an [crate::Id] string is not 40 hex characters.
    #[error("Invalid Id encoding: {0}")]
    InvalidIdEncoding(String),

    /// Indicates that a message nonce is not 20 bytes.
    #[error("Invalid nonce: {0:?}")]
    InvalidNonce(Vec<u8>),

    /// A contact's host could not be parsed as an IP address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Certificate bytes are not a signature followed by an Ed25519 public key.
    #[error("Invalid certificate")]
    InvalidCertificate,

    /// The envelope decoded fine, but its command is not one we handle.
    #[error("Unknown command: {0}")]
    UnknownCommand(i64),

    /// A saved [crate::rpc::State] could not be restored.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A response's arguments don't have the shape its command calls for.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}
