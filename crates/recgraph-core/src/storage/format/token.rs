//! Token record format (6 bytes)
//!
//! ```text
//! byte  0      in_use (b0)
//! bytes 1..5   name chain head, low 32 bits
//! byte  5      name chain head, high bits (b0..b3)
//! ```

use crate::storage::record::{
    get_u32, join_pointer, put_u32, split_pointer, Record, RecordFormat, RecordId,
    DYNAMIC_ID_BITS, IN_USE_FLAG,
};
use crate::Result;

/// Bytes per token record
pub const TOKEN_RECORD_SIZE: usize = 6;

/// A named token (label, property key or relationship type)
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRecord {
    pub id: u64,
    pub in_use: bool,
    /// Head of the dynamic chain holding the UTF-8 name
    pub name: RecordId,
}

impl Record for TokenRecord {
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

/// Layout of a token store holding at most `capacity` tokens
#[derive(Debug, Clone)]
pub struct TokenFormat {
    name: &'static str,
    capacity: u64,
}

impl TokenFormat {
    /// `capacity` must be at least 1
    pub fn new(name: &'static str, capacity: u64) -> Self {
        Self {
            name,
            capacity: capacity.max(1),
        }
    }

    /// Number of token ids, `0..capacity`
    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}

impl RecordFormat for TokenFormat {
    type Record = TokenRecord;

    fn name(&self) -> &'static str {
        self.name
    }

    fn record_size(&self) -> usize {
        TOKEN_RECORD_SIZE
    }

    fn id_bits(&self) -> u32 {
        u64::BITS - (self.capacity - 1).leading_zeros()
    }

    fn max_id(&self) -> u64 {
        self.capacity - 1
    }

    fn new_record(&self, id: u64) -> TokenRecord {
        TokenRecord {
            id,
            in_use: true,
            name: RecordId::NULL,
        }
    }

    fn decode(&self, id: u64, bytes: &[u8]) -> Result<TokenRecord> {
        Ok(TokenRecord {
            id,
            in_use: bytes[0] & IN_USE_FLAG != 0,
            name: join_pointer(get_u32(bytes, 1), bytes[5] & 0x0F, DYNAMIC_ID_BITS),
        })
    }

    fn encode(&self, record: &TokenRecord, bytes: &mut [u8]) -> Result<()> {
        let (low, high) = split_pointer(record.name, DYNAMIC_ID_BITS)?;
        bytes[0] = record.in_use as u8;
        put_u32(bytes, 1, low);
        bytes[5] = high;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_and_capacity() {
        let format = TokenFormat::new("property key", (1 << 24) - 1);
        assert_eq!(format.max_id(), (1 << 24) - 2);
        assert_eq!(format.id_bits(), 24);
        let labels = TokenFormat::new("label", 1 << 31);
        assert_eq!((labels.max_id(), labels.id_bits()), ((1 << 31) - 1, 31));

        let mut record = format.new_record(12);
        record.name = RecordId::new(1 << 34);
        let mut bytes = [0u8; TOKEN_RECORD_SIZE];
        format.encode(&record, &mut bytes).unwrap();
        assert_eq!(format.decode(12, &bytes).unwrap(), record);
    }
}
