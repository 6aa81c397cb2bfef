//! Dynamic record format (configurable block size)
//!
//! ```text
//! byte  0       flags: in_use (b0), start of chain (b1), next high bits (b4..b7)
//! bytes 1..4    payload length in this record (u24)
//! bytes 4..8    next record, low 32 bits
//! bytes 8..     payload
//! ```

use crate::storage::record::{
    get_u24, get_u32, join_pointer, put_u24, put_u32, split_pointer, Record, RecordFormat,
    RecordId, DYNAMIC_ID_BITS, IN_USE_FLAG,
};
use crate::{Error, Result};

/// Header bytes in front of every dynamic record's payload
pub const DYNAMIC_RECORD_HEADER_SIZE: usize = 8;

const START_OF_CHAIN: u8 = 0x02;

/// One block of a dynamic chain
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicRecord {
    pub id: u64,
    pub in_use: bool,
    /// Set on the head record of a chain
    pub start_of_chain: bool,
    /// Payload bytes held by this record
    pub data: Vec<u8>,
    pub next: RecordId,
}

impl Record for DynamicRecord {
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

/// Layout of a dynamic store; each store picks its own block size
#[derive(Debug, Clone)]
pub struct DynamicFormat {
    name: &'static str,
    block_size: usize,
}

impl DynamicFormat {
    /// Format for blocks of `block_size` bytes, header included
    pub fn new(name: &'static str, block_size: usize) -> Result<Self> {
        if block_size <= DYNAMIC_RECORD_HEADER_SIZE || block_size > (1 << 24) {
            return Err(Error::config(format!(
                "{} block size {} out of range",
                name, block_size
            )));
        }
        Ok(Self { name, block_size })
    }

    /// Payload bytes per record
    pub fn data_capacity(&self) -> usize {
        self.block_size - DYNAMIC_RECORD_HEADER_SIZE
    }
}

impl RecordFormat for DynamicFormat {
    type Record = DynamicRecord;

    fn name(&self) -> &'static str {
        self.name
    }

    fn record_size(&self) -> usize {
        self.block_size
    }

    fn id_bits(&self) -> u32 {
        DYNAMIC_ID_BITS
    }

    fn new_record(&self, id: u64) -> DynamicRecord {
        DynamicRecord {
            id,
            in_use: true,
            start_of_chain: false,
            data: Vec::new(),
            next: RecordId::NULL,
        }
    }

    fn decode(&self, id: u64, bytes: &[u8]) -> Result<DynamicRecord> {
        let flags = bytes[0];
        let in_use = flags & IN_USE_FLAG != 0;
        let length = get_u24(bytes, 1) as usize;
        if in_use && length > self.data_capacity() {
            return Err(Error::corruption(format!(
                "{} record {} claims {} bytes but holds at most {}",
                self.name,
                id,
                length,
                self.data_capacity()
            )));
        }
        let data = if in_use {
            bytes[DYNAMIC_RECORD_HEADER_SIZE..DYNAMIC_RECORD_HEADER_SIZE + length].to_vec()
        } else {
            Vec::new()
        };
        Ok(DynamicRecord {
            id,
            in_use,
            start_of_chain: flags & START_OF_CHAIN != 0,
            data,
            next: join_pointer(get_u32(bytes, 4), (flags >> 4) & 0x0F, DYNAMIC_ID_BITS),
        })
    }

    fn encode(&self, record: &DynamicRecord, bytes: &mut [u8]) -> Result<()> {
        if record.data.len() > self.data_capacity() {
            return Err(Error::storage(format!(
                "{} record {} payload of {} bytes exceeds capacity {}",
                self.name,
                record.id,
                record.data.len(),
                self.data_capacity()
            )));
        }
        let (next_low, next_high) = split_pointer(record.next, DYNAMIC_ID_BITS)?;
        let mut flags = record.in_use as u8 | (next_high << 4);
        if record.start_of_chain {
            flags |= START_OF_CHAIN;
        }
        bytes[0] = flags;
        put_u24(bytes, 1, record.data.len() as u32);
        put_u32(bytes, 4, next_low);
        let end = DYNAMIC_RECORD_HEADER_SIZE + record.data.len();
        bytes[DYNAMIC_RECORD_HEADER_SIZE..end].copy_from_slice(&record.data);
        bytes[end..].fill(0);
        Ok(())
    }
}
