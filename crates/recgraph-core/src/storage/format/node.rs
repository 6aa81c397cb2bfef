//! Node record format (15 bytes)
//!
//! ```text
//! byte  0      flags: in_use (b0), relationship high bits (b1..b3), property high bits (b4..b7)
//! bytes 1..5   relationship anchor, low 32 bits
//! bytes 5..9   first property, low 32 bits
//! bytes 9..14  label field (40 bits)
//! byte  14     extra: dense (b0)
//! ```

use crate::storage::record::{
    get_u32, get_u40, join_pointer, put_u32, put_u40, split_pointer, Record, RecordFormat,
    RecordId, IN_USE_FLAG, NODE_ID_BITS, PROPERTY_ID_BITS, RELATIONSHIP_ID_BITS,
};
use crate::Result;

/// Bytes per node record
pub const NODE_RECORD_SIZE: usize = 15;

const DENSE_FLAG: u8 = 0x01;

/// Raw 40-bit label field of a node; see [`crate::labels`] for its encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LabelField(pub u64);

impl LabelField {
    /// No labels
    pub const EMPTY: LabelField = LabelField(0);
}

/// A node record
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    /// Node id
    pub id: u64,
    /// Liveness flag
    pub in_use: bool,
    /// Whether `relationship_anchor` points at a relationship group chain
    pub is_dense: bool,
    /// First relationship (sparse) or first relationship group (dense)
    pub relationship_anchor: RecordId,
    /// Head of the property chain
    pub first_property: RecordId,
    /// Inline or dynamic label encoding
    pub label_field: LabelField,
}

impl Record for NodeRecord {
    fn id(&self) -> u64 {
        self.id
    }

    fn in_use(&self) -> bool {
        self.in_use
    }

    fn set_in_use(&mut self, in_use: bool) {
        self.in_use = in_use;
    }
}

/// Layout of `nodes.store`
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeFormat;

impl RecordFormat for NodeFormat {
    type Record = NodeRecord;

    fn name(&self) -> &'static str {
        "node"
    }

    fn record_size(&self) -> usize {
        NODE_RECORD_SIZE
    }

    fn id_bits(&self) -> u32 {
        NODE_ID_BITS
    }

    fn new_record(&self, id: u64) -> NodeRecord {
        NodeRecord {
            id,
            in_use: true,
            is_dense: false,
            relationship_anchor: RecordId::NULL,
            first_property: RecordId::NULL,
            label_field: LabelField::EMPTY,
        }
    }

    fn decode(&self, id: u64, bytes: &[u8]) -> Result<NodeRecord> {
        let flags = bytes[0];
        let rel_high = (flags >> 1) & 0x07;
        let prop_high = (flags >> 4) & 0x0F;
        Ok(NodeRecord {
            id,
            in_use: flags & IN_USE_FLAG != 0,
            is_dense: bytes[14] & DENSE_FLAG != 0,
            relationship_anchor: join_pointer(get_u32(bytes, 1), rel_high, RELATIONSHIP_ID_BITS),
            first_property: join_pointer(get_u32(bytes, 5), prop_high, PROPERTY_ID_BITS),
            label_field: LabelField(get_u40(bytes, 9)),
        })
    }

    fn encode(&self, record: &NodeRecord, bytes: &mut [u8]) -> Result<()> {
        let (rel_low, rel_high) = split_pointer(record.relationship_anchor, RELATIONSHIP_ID_BITS)?;
        let (prop_low, prop_high) = split_pointer(record.first_property, PROPERTY_ID_BITS)?;

        bytes[0] = (record.in_use as u8) | (rel_high << 1) | (prop_high << 4);
        put_u32(bytes, 1, rel_low);
        put_u32(bytes, 5, prop_low);
        put_u40(bytes, 9, record.label_field.0 & 0xFF_FFFF_FFFF);
        bytes[14] = if record.is_dense { DENSE_FLAG } else { 0 };
        Ok(())
    }
}
