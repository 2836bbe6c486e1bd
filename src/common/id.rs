//! Kademlia node Id or a lookup target
use rand::Rng;
use sha1_smol::Sha1;
use std::{
    fmt::{self, Debug, Display, Formatter},
    str::FromStr,
};

use crate::{Error, Result};

/// The size of node IDs in bytes.
pub const ID_SIZE: usize = 20;
/// The size of node IDs in bits, and the furthest possible log distance.
pub const MAX_DISTANCE: u8 = ID_SIZE as u8 * 8;

#[derive(Clone, Copy, PartialEq, Ord, PartialOrd, Eq, Hash)]
/// Kademlia node Id or a lookup target
///
/// Ordering of Ids is the ordering of their big-endian integer value, so
/// comparing two [Id::xor] results compares XOR distances.
pub struct Id(pub [u8; ID_SIZE]);

impl Id {
    pub fn random() -> Id {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; 20] = rng.gen();

        Id(random_bytes)
    }

    /// Create a new Id from some bytes. Returns Err if `bytes` is not of length
    /// [ID_SIZE](crate::common::ID_SIZE).
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Id> {
        let bytes = bytes.as_ref();
        if bytes.len() != ID_SIZE {
            return Err(Error::InvalidIdSize(bytes.len()));
        }

        let mut tmp: [u8; ID_SIZE] = [0; ID_SIZE];
        tmp[..ID_SIZE].clone_from_slice(&bytes[..ID_SIZE]);

        Ok(Id(tmp))
    }

    /// SHA-1 digest of arbitrary bytes.
    pub fn digest<T: AsRef<[u8]>>(bytes: T) -> Id {
        let mut hasher = Sha1::new();
        hasher.update(bytes.as_ref());

        Id(hasher.digest().bytes())
    }

    /// The identifier a keyword is stored under.
    ///
    /// Keywords are usually already 20 byte digests, in which case they are used as is,
    /// anything else is hashed with [Id::digest].
    pub fn for_keyword<T: AsRef<[u8]>>(keyword: T) -> Id {
        let keyword = keyword.as_ref();

        Id::from_bytes(keyword).unwrap_or_else(|_| Id::digest(keyword))
    }

    /// Bitwise XOR of two Ids, the Kademlia distance metric.
    pub fn xor(&self, other: &Id) -> Id {
        let mut result = [0_u8; ID_SIZE];

        for (i, byte) in result.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }

        Id(result)
    }

    /// Simplified XOR distance between this Id and a target Id.
    ///
    /// The distance is the number of trailing non zero bits in the XOR result.
    ///
    /// Distance to self is 0
    /// Distance to the furthest Id is 160
    /// Distance to an Id with 5 leading matching bits is 155
    pub fn distance(&self, other: &Id) -> u8 {
        for i in 0..ID_SIZE {
            let a = self.0[i];
            let b = other.0[i];

            if a != b {
                // leading zeros so far + leading zeros of this byte
                let leading_zeros = (i as u32 * 8 + (a ^ b).leading_zeros()) as u8;

                return MAX_DISTANCE - leading_zeros;
            }
        }

        0
    }

    /// Number of leading bits shared with `other`, 160 for the same Id.
    pub fn shared_prefix_len(&self, other: &Id) -> u8 {
        MAX_DISTANCE - self.distance(other)
    }

    /// A random Id that shares exactly `prefix_len` leading bits with this Id.
    ///
    /// That is a random Id inside the range covered by the k-bucket at index `prefix_len`.
    pub fn random_in_bucket(&self, prefix_len: u8) -> Id {
        if prefix_len >= MAX_DISTANCE {
            return *self;
        }

        let mut bytes: [u8; ID_SIZE] = rand::thread_rng().gen();

        let byte = prefix_len as usize / 8;
        let bit = prefix_len as usize % 8;

        bytes[..byte].copy_from_slice(&self.0[..byte]);

        let keep: u8 = if bit == 0 { 0 } else { 0xff << (8 - bit) };
        let flip: u8 = 0x80 >> bit;
        let own = self.0[byte];

        bytes[byte] = (own & keep) | (!own & flip) | (bytes[byte] & !(keep | flip));

        Id(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl From<[u8; ID_SIZE]> for Id {
    fn from(bytes: [u8; ID_SIZE]) -> Id {
        Id(bytes)
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }

        Ok(())
    }
}

impl Debug for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self)
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Id> {
        if s.len() != ID_SIZE * 2 || !s.is_ascii() {
            return Err(Error::InvalidIdEncoding(s.to_string()));
        }

        let mut bytes = [0_u8; ID_SIZE];

        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| Error::InvalidIdEncoding(s.to_string()))?;
        }

        Ok(Id(bytes))
    }
}
