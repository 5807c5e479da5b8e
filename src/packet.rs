//! Fixed-size packet type moved through the pipeline.
//!
//! A [`Packet`] is an opaque fixed-size binary record. Its size is chosen
//! when the pipeline is configured and never changes for the lifetime of
//! that pipeline instance; its content is mutable while owned by the stage
//! currently processing it. The engine does not interpret the payload;
//! any wire format is the business of individual plugins.

use bytes::BytesMut;

/// Default packet size in bytes (one MPEG transport-stream packet).
pub const DEFAULT_PACKET_SIZE: usize = 188;

/// Metadata carried alongside each packet payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketMetadata {
    /// Sequence number, stamped by the input stage in arrival order.
    pub sequence: u64,
    /// Whether this packet is stuffing injected by the engine, as opposed
    /// to a real packet produced by the input plugin.
    pub stuffing: bool,
}

impl PacketMetadata {
    /// Create metadata with the given sequence number.
    pub fn with_sequence(sequence: u64) -> Self {
        Self {
            sequence,
            stuffing: false,
        }
    }
}

/// A fixed-size binary packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    payload: BytesMut,
    metadata: PacketMetadata,
}

impl Packet {
    /// Create a packet from a payload.
    pub fn new(payload: impl Into<BytesMut>) -> Self {
        Self {
            payload: payload.into(),
            metadata: PacketMetadata::default(),
        }
    }

    /// Create a packet with explicit metadata.
    pub fn with_metadata(payload: impl Into<BytesMut>, metadata: PacketMetadata) -> Self {
        Self {
            payload: payload.into(),
            metadata,
        }
    }

    /// Create a null (stuffing) packet of the given size.
    ///
    /// The payload is zero-filled; the stuffing flag is set so downstream
    /// stages and tests can tell engine-injected packets from real ones.
    pub fn null(size: usize) -> Self {
        let mut payload = BytesMut::with_capacity(size);
        payload.resize(size, 0);
        Self {
            payload,
            metadata: PacketMetadata {
                sequence: 0,
                stuffing: true,
            },
        }
    }

    /// Whether this packet is engine-injected stuffing.
    pub fn is_null(&self) -> bool {
        self.metadata.stuffing
    }

    /// Packet size in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty (a degenerate zero-size packet).
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Read access to the payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Mutable access to the payload. The size must not change; stages
    /// rewrite content in place.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.payload
    }

    /// Read access to the metadata.
    pub fn metadata(&self) -> &PacketMetadata {
        &self.metadata
    }

    /// Mutable access to the metadata.
    pub fn metadata_mut(&mut self) -> &mut PacketMetadata {
        &mut self.metadata
    }
}
