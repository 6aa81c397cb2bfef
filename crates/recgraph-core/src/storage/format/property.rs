//! Property record format (42 bytes)
//!
//! ```text
//! byte  0       in_use (b0)
//! byte  1       prev high bits (b4..b7), next high bits (b0..b3)
//! bytes 2..6    prev record, low 32 bits
//! bytes 6..10   next record, low 32 bits
//! bytes 10..42  four payload words holding consecutive property blocks
//! ```
//!
//! Unused payload words are zero. A zero word can never start a block
//! because type code 0 is unassigned, so decoding stops at the first one.

use crate::property::block::{block_length, PropertyBlock};
use crate::storage::record::{
    get_u32, get_u64, join_pointer, put_u32, put_u64, split_pointer, Record, RecordFormat,
    RecordId, IN_USE_FLAG, PROPERTY_ID_BITS,
};
use crate::{Error, Result};

/// Bytes per property record
pub const PROPERTY_RECORD_SIZE: usize = 42;

/// Payload words per property record
pub const PAYLOAD_WORDS: usize = 4;

const PAYLOAD_OFFSET: usize = 10;

/// A node in an entity's property chain
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRecord {
    pub id: u64,
    pub in_use: bool,
    pub prev: RecordId,
    pub next: RecordId,
    pub blocks: Vec<PropertyBlock>,
}

impl PropertyRecord {
    /// Payload words taken by the current blocks
    pub fn used_words(&self) -> usize {
        self.blocks.iter().map(PropertyBlock::len).sum()
    }

    /// Whether `words` more payload words would still fit
    pub fn has_room_for(&self, words: usize) -> bool {
        self.used_words() + words <= PAYLOAD_WORDS
    }

    /// Block for `key`, if present
    pub fn block(&self, key: u32) -> Option<&PropertyBlock> {
        self.blocks.iter().find(|block| block.key() == key)
    }

    /// Remove and return the block for `key`
    pub fn remove_block(&mut self, key: u32) -> Option<PropertyBlock> {
        let index = self.blocks.iter().position(|block| block.key() == key)?;
        Some(self.blocks.remove(index))
    }
}

impl Record for PropertyRecord {
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

/// Layout of `properties.store`
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyFormat;

impl RecordFormat for PropertyFormat {
    type Record = PropertyRecord;

    fn name(&self) -> &'static str {
        "property"
    }

    fn record_size(&self) -> usize {
        PROPERTY_RECORD_SIZE
    }

    fn id_bits(&self) -> u32 {
        PROPERTY_ID_BITS
    }

    fn new_record(&self, id: u64) -> PropertyRecord {
        PropertyRecord {
            id,
            in_use: true,
            prev: RecordId::NULL,
            next: RecordId::NULL,
            blocks: Vec::new(),
        }
    }

    fn decode(&self, id: u64, bytes: &[u8]) -> Result<PropertyRecord> {
        let in_use = bytes[0] & IN_USE_FLAG != 0;
        let high = bytes[1];
        let prev = join_pointer(get_u32(bytes, 2), high >> 4, PROPERTY_ID_BITS);
        let next = join_pointer(get_u32(bytes, 6), high & 0x0F, PROPERTY_ID_BITS);

        let words: Vec<u64> = (0..PAYLOAD_WORDS)
            .map(|i| get_u64(bytes, PAYLOAD_OFFSET + i * 8))
            .collect();
        let mut blocks = Vec::new();
        if in_use {
            let mut i = 0;
            while i < PAYLOAD_WORDS && words[i] != 0 {
                let len = block_length(words[i])?;
                if i + len > PAYLOAD_WORDS {
                    return Err(Error::corruption(format!(
                        "property record {} has a block overrunning its payload",
                        id
                    )));
                }
                blocks.push(PropertyBlock::from_words(words[i..i + len].to_vec())?);
                i += len;
            }
        }
        Ok(PropertyRecord {
            id,
            in_use,
            prev,
            next,
            blocks,
        })
    }

    fn encode(&self, record: &PropertyRecord, bytes: &mut [u8]) -> Result<()> {
        if record.used_words() > PAYLOAD_WORDS {
            return Err(Error::storage(format!(
                "property record {} needs {} payload words, only {} fit",
                record.id,
                record.used_words(),
                PAYLOAD_WORDS
            )));
        }
        let (prev_low, prev_high) = split_pointer(record.prev, PROPERTY_ID_BITS)?;
        let (next_low, next_high) = split_pointer(record.next, PROPERTY_ID_BITS)?;
        bytes[0] = record.in_use as u8;
        bytes[1] = (prev_high << 4) | next_high;
        put_u32(bytes, 2, prev_low);
        put_u32(bytes, 6, next_low);

        let mut slot = 0;
        for word in record.blocks.iter().flat_map(|block| block.words().iter()) {
            put_u64(bytes, PAYLOAD_OFFSET + slot * 8, *word);
            slot += 1;
        }
        for rest in slot..PAYLOAD_WORDS {
            put_u64(bytes, PAYLOAD_OFFSET + rest * 8, 0);
        }
        Ok(())
    }
}
