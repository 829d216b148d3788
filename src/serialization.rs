//! # Serialization Fixture
//!
//! Sample values for the binary serialization benches: two small structs,
//! a node identifier in both of its shapes and a two-integer message. The
//! fixture keeps a pre-encoded copy of every value for the deserialization
//! side and a reusable scratch buffer for the serialization side.
//!
//! bincode is the codec; the fixture only prepares inputs.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Seed for the hashed node id, so every run encodes the same bytes.
pub const NODE_ID_SEED: u64 = 0xCAF;

/// URI form of the sample node id.
pub const NODE_URI: &str = "caf:40dd4919-6585-40c3-b853-712edce5de34";

/// Length of the host hash in a hashed node id.
pub const HOST_ID_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Foo {
    pub a: i32,
    pub b: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub a: Foo,
    pub b: String,
}

/// Identity of a node, either hashed or given by a URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeId {
    Hashed {
        process_id: u32,
        host: [u8; HOST_ID_SIZE],
    },
    Uri(String),
}

impl NodeId {
    /// Hashed node id with every field drawn from `rng`.
    pub fn random(rng: &mut impl RngCore) -> Self {
        let mut host = [0u8; HOST_ID_SIZE];
        rng.fill_bytes(&mut host);
        NodeId::Hashed {
            process_id: rng.next_u32(),
            host,
        }
    }
}

/// The two-integer message.
pub type IntPair = (i32, i32);

/// Pre-encoded form of each sample value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedValues {
    pub foo: Vec<u8>,
    pub bar: Vec<u8>,
    pub hashed_node_id: Vec<u8>,
    pub uri_node_id: Vec<u8>,
    pub message: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct SerializationFixture {
    pub foo: Foo,
    pub bar: Bar,
    pub hashed_node_id: NodeId,
    pub uri_node_id: NodeId,
    pub message: IntPair,
    encoded: Option<EncodedValues>,
    scratch: Vec<u8>,
}

impl SerializationFixture {
    pub fn new() -> Self {
        let mut rng = StdRng::seed_from_u64(NODE_ID_SEED);
        Self {
            foo: Foo { a: 10, b: 20 },
            bar: Bar {
                a: Foo { a: 1, b: 2 },
                b: "three".to_string(),
            },
            hashed_node_id: NodeId::random(&mut rng),
            uri_node_id: NodeId::Uri(NODE_URI.to_string()),
            message: (1, 2),
            encoded: None,
            scratch: Vec::new(),
        }
    }

    /// Encode every sample value once.
    pub fn set_up(&mut self) -> Result<()> {
        let encoded = EncodedValues {
            foo: bincode::serialize(&self.foo).context("failed to encode foo")?,
            bar: bincode::serialize(&self.bar).context("failed to encode bar")?,
            hashed_node_id: bincode::serialize(&self.hashed_node_id)
                .context("failed to encode hashed node id")?,
            uri_node_id: bincode::serialize(&self.uri_node_id)
                .context("failed to encode uri node id")?,
            message: bincode::serialize(&self.message).context("failed to encode message")?,
        };
        debug!(
            foo = encoded.foo.len(),
            bar = encoded.bar.len(),
            hashed_node_id = encoded.hashed_node_id.len(),
            uri_node_id = encoded.uri_node_id.len(),
            message = encoded.message.len(),
            "serialization fixture ready"
        );
        self.encoded = Some(encoded);
        Ok(())
    }

    pub fn tear_down(&mut self) {
        self.encoded = None;
        self.scratch = Vec::new();
    }

    /// Encoded values, present between `set_up` and `tear_down`.
    pub fn encoded(&self) -> Option<&EncodedValues> {
        self.encoded.as_ref()
    }

    /// Serialize `value` into the scratch buffer, reusing its allocation.
    pub fn save<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<&[u8]> {
        self.scratch.clear();
        bincode::serialize_into(&mut self.scratch, value).context("failed to serialize value")?;
        Ok(&self.scratch)
    }

    pub fn load<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes).context("failed to deserialize value")
    }
}

impl Default for SerializationFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashed_node_id_is_deterministic() {
        let a = SerializationFixture::new();
        let b = SerializationFixture::new();
        assert_eq!(a.hashed_node_id, b.hashed_node_id);
        assert!(matches!(a.hashed_node_id, NodeId::Hashed { .. }));
        assert_eq!(a.uri_node_id, NodeId::Uri(NODE_URI.to_string()));
    }

    #[test]
    fn test_set_up_and_tear_down() {
        let mut fixture = SerializationFixture::new();
        assert!(fixture.encoded().is_none());
        fixture.set_up().unwrap();

        let encoded = fixture.encoded().unwrap().clone();
        // Two little-endian i32s.
        assert_eq!(encoded.foo, vec![10, 0, 0, 0, 20, 0, 0, 0]);
        assert_eq!(encoded.message.len(), 8);

        fixture.tear_down();
        assert!(fixture.encoded().is_none());
    }

    #[test]
    fn test_load_restores_saved_values() {
        let mut fixture = SerializationFixture::new();
        fixture.set_up().unwrap();
        let encoded = fixture.encoded().unwrap().clone();

        let bar: Bar = fixture.load(&encoded.bar).unwrap();
        assert_eq!(bar, fixture.bar);
        let node: NodeId = fixture.load(&encoded.hashed_node_id).unwrap();
        assert_eq!(node, fixture.hashed_node_id);
        let uri: NodeId = fixture.load(&encoded.uri_node_id).unwrap();
        assert_eq!(uri, fixture.uri_node_id);
    }

    #[test]
    fn test_save_reuses_scratch_buffer() {
        let mut fixture = SerializationFixture::new();
        let bar = fixture.bar.clone();
        let first = fixture.save(&bar).unwrap().to_vec();
        let message = fixture.message;
        let second = fixture.save(&message).unwrap().to_vec();
        assert_eq!(second, bincode::serialize(&message).unwrap());
        assert_ne!(first, second);
    }

    #[test]
    fn test_load_rejects_truncated_input() {
        let fixture = SerializationFixture::new();
        assert!(fixture.load::<Foo>(&[1, 2, 3]).is_err());
    }
}
