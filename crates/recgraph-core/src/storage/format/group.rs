//! Relationship group record format (37 bytes)
//!
//! ```text
//! byte  0       in_use (b0)
//! bytes 1..3    type id (u16)
//! bytes 3..7    next group   7..11 first out   11..15 first in   15..19 first loop
//! bytes 19..23  owning node
//! bytes 23..25  high bits, 3 per pointer: next, out, in, loop, owner
//! bytes 25..29  out count   29..33 in count   33..37 loop count
//! ```

use crate::storage::format::relationship::MAX_RELATIONSHIP_TYPE;
use crate::storage::record::{
    get_u16, get_u32, join_pointer, put_u16, put_u32, split_pointer, Record, RecordFormat,
    RecordId, GROUP_ID_BITS, IN_USE_FLAG, NODE_ID_BITS, RELATIONSHIP_ID_BITS,
};
use crate::{Error, Result};

/// Bytes per relationship group record
pub const GROUP_RECORD_SIZE: usize = 37;

/// Per-type partition of a dense node's relationships
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRecord {
    pub id: u64,
    pub in_use: bool,
    pub rel_type: u32,
    pub owning_node: u64,
    /// Next group of the same node, ascending by type
    pub next_group: RecordId,
    pub first_out: RecordId,
    pub first_in: RecordId,
    pub first_loop: RecordId,
    pub out_count: u32,
    pub in_count: u32,
    pub loop_count: u32,
}

impl GroupRecord {
    /// Sum of the three directional counters
    pub fn total_count(&self) -> u64 {
        u64::from(self.out_count) + u64::from(self.in_count) + u64::from(self.loop_count)
    }
}

impl Record for GroupRecord {
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

/// Layout of `relationship_groups.store`
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupFormat;

impl RecordFormat for GroupFormat {
    type Record = GroupRecord;

    fn name(&self) -> &'static str {
        "relationship group"
    }

    fn record_size(&self) -> usize {
        GROUP_RECORD_SIZE
    }

    fn id_bits(&self) -> u32 {
        GROUP_ID_BITS
    }

    fn new_record(&self, id: u64) -> GroupRecord {
        GroupRecord {
            id,
            in_use: true,
            rel_type: 0,
            owning_node: 0,
            next_group: RecordId::NULL,
            first_out: RecordId::NULL,
            first_in: RecordId::NULL,
            first_loop: RecordId::NULL,
            out_count: 0,
            in_count: 0,
            loop_count: 0,
        }
    }

    fn decode(&self, id: u64, bytes: &[u8]) -> Result<GroupRecord> {
        let high = get_u16(bytes, 23);
        let pointer = |offset: usize, slot: u16, bits: u32| {
            join_pointer(get_u32(bytes, offset), ((high >> (slot * 3)) & 0x07) as u8, bits)
        };
        Ok(GroupRecord {
            id,
            in_use: bytes[0] & IN_USE_FLAG != 0,
            rel_type: u32::from(get_u16(bytes, 1)),
            next_group: pointer(3, 0, GROUP_ID_BITS),
            first_out: pointer(7, 1, RELATIONSHIP_ID_BITS),
            first_in: pointer(11, 2, RELATIONSHIP_ID_BITS),
            first_loop: pointer(15, 3, RELATIONSHIP_ID_BITS),
            owning_node: pointer(19, 4, NODE_ID_BITS).raw(),
            out_count: get_u32(bytes, 25),
            in_count: get_u32(bytes, 29),
            loop_count: get_u32(bytes, 33),
        })
    }

    fn encode(&self, record: &GroupRecord, bytes: &mut [u8]) -> Result<()> {
        if record.rel_type > MAX_RELATIONSHIP_TYPE {
            return Err(Error::storage(format!(
                "relationship type {} exceeds the 16-bit type field",
                record.rel_type
            )));
        }
        let pointers = [
            (record.next_group, GROUP_ID_BITS, 3),
            (record.first_out, RELATIONSHIP_ID_BITS, 7),
            (record.first_in, RELATIONSHIP_ID_BITS, 11),
            (record.first_loop, RELATIONSHIP_ID_BITS, 15),
            (RecordId::new(record.owning_node), NODE_ID_BITS, 19),
        ];
        let mut high = 0u16;
        for (slot, (pointer, bits, offset)) in pointers.into_iter().enumerate() {
            let (low, high_bits) = split_pointer(pointer, bits)?;
            put_u32(bytes, offset, low);
            high |= u16::from(high_bits) << (slot as u16 * 3);
        }
        bytes[0] = record.in_use as u8;
        put_u16(bytes, 1, record.rel_type as u16);
        put_u16(bytes, 23, high);
        put_u32(bytes, 25, record.out_count);
        put_u32(bytes, 29, record.in_count);
        put_u32(bytes, 33, record.loop_count);
        Ok(())
    }
}
