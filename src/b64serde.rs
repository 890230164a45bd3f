//! base64 ser & de for raw bytes carried in sector states

use base64::STANDARD;
use base64_serde::base64_serde_type;
use serde::{Deserialize, Serialize};

base64_serde_type!(pub B64SerDe, STANDARD);

/// Vec<u8> with base64 ser & de
#[derive(Clone, Debug, Default, PartialEq, Hash, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct B64Vec(#[serde(with = "B64SerDe")] pub Vec<u8>);

impl B64Vec {
    /// if there is no byte inside
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// length of the inner bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<u8>> for B64Vec {
    fn from(val: Vec<u8>) -> B64Vec {
        B64Vec(val)
    }
}

impl From<&[u8]> for B64Vec {
    fn from(val: &[u8]) -> B64Vec {
        B64Vec(val.to_vec())
    }
}

impl AsRef<[u8]> for B64Vec {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
