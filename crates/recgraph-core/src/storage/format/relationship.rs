//! Relationship record format (34 bytes)
//!
//! ```text
//! byte  0       flags: in_use (b0), first in start chain (b1), first in end chain (b2),
//!               property high bits (b4..b7)
//! bytes 1..5    start node, low 32 bits
//! bytes 5..9    end node, low 32 bits
//! bytes 9..11   type id (u16)
//! bytes 11..15  start_prev   15..19 start_next   19..23 end_prev   23..27 end_next
//! bytes 27..31  first property, low 32 bits
//! bytes 31..34  high bits, 3 per pointer: start, end, start_prev, start_next, end_prev, end_next
//! ```

use crate::storage::record::{
    get_u16, get_u24, get_u32, join_pointer, put_u16, put_u24, put_u32, split_pointer, Record,
    RecordFormat, RecordId, IN_USE_FLAG, NODE_ID_BITS, PROPERTY_ID_BITS, RELATIONSHIP_ID_BITS,
};
use crate::{Error, Result};

/// Bytes per relationship record
pub const RELATIONSHIP_RECORD_SIZE: usize = 34;

/// Largest relationship type id the record can hold
pub const MAX_RELATIONSHIP_TYPE: u32 = u16::MAX as u32;

const FIRST_IN_START_CHAIN: u8 = 0x02;
const FIRST_IN_END_CHAIN: u8 = 0x04;

/// A relationship record
///
/// The record sits in two doubly-linked chains: the start node's (through
/// the `start_*` links) and the end node's (through the `end_*` links). A
/// self-loop sits in its node's chain once, with both link sets kept equal.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipRecord {
    /// Relationship id
    pub id: u64,
    /// Liveness flag
    pub in_use: bool,
    /// Start node id
    pub start_node: u64,
    /// End node id
    pub end_node: u64,
    /// Relationship type token id
    pub rel_type: u32,
    /// Previous relationship in the start node's chain
    pub start_prev: RecordId,
    /// Next relationship in the start node's chain
    pub start_next: RecordId,
    /// Previous relationship in the end node's chain
    pub end_prev: RecordId,
    /// Next relationship in the end node's chain
    pub end_next: RecordId,
    /// Whether this record heads the start node's chain
    pub first_in_start_chain: bool,
    /// Whether this record heads the end node's chain
    pub first_in_end_chain: bool,
    /// Head of the property chain
    pub first_property: RecordId,
}

impl RelationshipRecord {
    /// Whether start and end are the same node
    pub fn is_loop(&self) -> bool {
        self.start_node == self.end_node
    }

    /// `(prev, next)` links of this record within `node`'s chain
    pub fn links_for(&self, node: u64) -> (RecordId, RecordId) {
        if self.start_node == node {
            (self.start_prev, self.start_next)
        } else {
            (self.end_prev, self.end_next)
        }
    }

    /// Next relationship in `node`'s chain
    pub fn next_for(&self, node: u64) -> RecordId {
        self.links_for(node).1
    }

    /// Set the previous link in `node`'s chain (both link sets for a loop)
    pub fn set_prev_for(&mut self, node: u64, prev: RecordId) {
        if self.start_node == node {
            self.start_prev = prev;
        }
        if self.end_node == node {
            self.end_prev = prev;
        }
    }

    /// Set the next link in `node`'s chain (both link sets for a loop)
    pub fn set_next_for(&mut self, node: u64, next: RecordId) {
        if self.start_node == node {
            self.start_next = next;
        }
        if self.end_node == node {
            self.end_next = next;
        }
    }

    /// Set the chain-head flag for `node`'s chain
    pub fn set_first_for(&mut self, node: u64, first: bool) {
        if self.start_node == node {
            self.first_in_start_chain = first;
        }
        if self.end_node == node {
            self.first_in_end_chain = first;
        }
    }

    /// Whether this record heads `node`'s chain
    pub fn is_first_for(&self, node: u64) -> bool {
        if self.start_node == node {
            self.first_in_start_chain
        } else {
            self.first_in_end_chain
        }
    }

    /// The endpoint that is not `node` (`node` itself for a loop)
    pub fn other_node(&self, node: u64) -> u64 {
        if self.start_node == node {
            self.end_node
        } else {
            self.start_node
        }
    }
}

impl Record for RelationshipRecord {
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

/// Layout of `relationships.store`
#[derive(Debug, Clone, Copy, Default)]
pub struct RelationshipFormat;

impl RecordFormat for RelationshipFormat {
    type Record = RelationshipRecord;

    fn name(&self) -> &'static str {
        "relationship"
    }

    fn record_size(&self) -> usize {
        RELATIONSHIP_RECORD_SIZE
    }

    fn id_bits(&self) -> u32 {
        RELATIONSHIP_ID_BITS
    }

    fn new_record(&self, id: u64) -> RelationshipRecord {
        RelationshipRecord {
            id,
            in_use: true,
            start_node: 0,
            end_node: 0,
            rel_type: 0,
            start_prev: RecordId::NULL,
            start_next: RecordId::NULL,
            end_prev: RecordId::NULL,
            end_next: RecordId::NULL,
            first_in_start_chain: false,
            first_in_end_chain: false,
            first_property: RecordId::NULL,
        }
    }

    fn decode(&self, id: u64, bytes: &[u8]) -> Result<RelationshipRecord> {
        let flags = bytes[0];
        let high = get_u24(bytes, 31);
        let high_bits = |slot: u32| ((high >> (slot * 3)) & 0x07) as u8;
        let node = |offset: usize, slot: u32| {
            join_pointer(get_u32(bytes, offset), high_bits(slot), NODE_ID_BITS)
        };
        let rel = |offset: usize, slot: u32| {
            join_pointer(get_u32(bytes, offset), high_bits(slot), RELATIONSHIP_ID_BITS)
        };

        Ok(RelationshipRecord {
            id,
            in_use: flags & IN_USE_FLAG != 0,
            start_node: node(1, 0).raw(),
            end_node: node(5, 1).raw(),
            rel_type: u32::from(get_u16(bytes, 9)),
            start_prev: rel(11, 2),
            start_next: rel(15, 3),
            end_prev: rel(19, 4),
            end_next: rel(23, 5),
            first_in_start_chain: flags & FIRST_IN_START_CHAIN != 0,
            first_in_end_chain: flags & FIRST_IN_END_CHAIN != 0,
            first_property: join_pointer(get_u32(bytes, 27), (flags >> 4) & 0x0F, PROPERTY_ID_BITS),
        })
    }

    fn encode(&self, record: &RelationshipRecord, bytes: &mut [u8]) -> Result<()> {
        if record.rel_type > MAX_RELATIONSHIP_TYPE {
            return Err(Error::storage(format!(
                "relationship type {} exceeds the 16-bit type field",
                record.rel_type
            )));
        }
        let pointers = [
            (RecordId::new(record.start_node), NODE_ID_BITS, 1),
            (RecordId::new(record.end_node), NODE_ID_BITS, 5),
            (record.start_prev, RELATIONSHIP_ID_BITS, 11),
            (record.start_next, RELATIONSHIP_ID_BITS, 15),
            (record.end_prev, RELATIONSHIP_ID_BITS, 19),
            (record.end_next, RELATIONSHIP_ID_BITS, 23),
        ];
        let mut high = 0u32;
        for (slot, (pointer, bits, offset)) in pointers.into_iter().enumerate() {
            let (low, high_bits) = split_pointer(pointer, bits)?;
            put_u32(bytes, offset, low);
            high |= u32::from(high_bits) << (slot as u32 * 3);
        }
        put_u24(bytes, 31, high);

        let (prop_low, prop_high) = split_pointer(record.first_property, PROPERTY_ID_BITS)?;
        put_u32(bytes, 27, prop_low);
        put_u16(bytes, 9, record.rel_type as u16);

        let mut flags = record.in_use as u8;
        if record.first_in_start_chain {
            flags |= FIRST_IN_START_CHAIN;
        }
        if record.first_in_end_chain {
            flags |= FIRST_IN_END_CHAIN;
        }
        bytes[0] = flags | (prop_high << 4);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_with_high_ids() {
        let mut record = RelationshipFormat.new_record(77);
        record.start_node = (1 << 33) + 1;
        record.end_node = (1 << 32) - 1;
        record.rel_type = 65_000;
        record.start_next = RecordId::new((1 << 34) + 9);
        record.end_prev = RecordId::new(12);
        record.first_in_start_chain = true;
        record.first_property = RecordId::new((1 << 35) + 3);

        let mut bytes = [0u8; RELATIONSHIP_RECORD_SIZE];
        RelationshipFormat.encode(&record, &mut bytes).unwrap();
        let decoded = RelationshipFormat.decode(77, &bytes).unwrap();
        assert_eq!(decoded, record);
        assert!(decoded.start_prev.is_null());
        assert!(decoded.end_next.is_null());
    }

    #[test]
    fn test_type_overflow_is_rejected() {
        let mut record = RelationshipFormat.new_record(0);
        record.rel_type = MAX_RELATIONSHIP_TYPE + 1;
        let mut bytes = [0u8; RELATIONSHIP_RECORD_SIZE];
        assert!(RelationshipFormat.encode(&record, &mut bytes).is_err());
    }

    #[test]
    fn test_loop_links_are_mirrored() {
        let mut record = RelationshipFormat.new_record(1);
        record.start_node = 4;
        record.end_node = 4;
        record.set_next_for(4, RecordId::new(8));
        record.set_first_for(4, true);
        assert_eq!(record.start_next, record.end_next);
        assert!(record.first_in_start_chain && record.first_in_end_chain);
        assert_eq!(record.other_node(4), 4);
    }
}
