//! Record primitives shared by every store
//!
//! Records are fixed-size byte slots at offset `id × record_size`. Each
//! record starts with a flags byte whose bit 0 is the in-use flag.
//!
//! Pointer fields are split: the low 32 bits live in a native `u32` field and
//! the remaining high bits are packed into spare header bits. The all-ones
//! value of the full width is the null sentinel, so a 35-bit pointer can
//! address ids `0..=2^35 - 2` and `2^32 - 1` is an ordinary id.

use crate::{Error, Result};
use std::fmt;

/// In-use flag, bit 0 of every record's first byte
pub const IN_USE_FLAG: u8 = 0x01;

/// Id width of node, relationship and relationship group pointers
pub const NODE_ID_BITS: u32 = 35;
/// Id width of relationship pointers
pub const RELATIONSHIP_ID_BITS: u32 = 35;
/// Id width of relationship group pointers
pub const GROUP_ID_BITS: u32 = 35;
/// Id width of property and dynamic record pointers
pub const PROPERTY_ID_BITS: u32 = 36;
/// Id width of dynamic record pointers
pub const DYNAMIC_ID_BITS: u32 = 36;

/// Identifier of a record, or the null sentinel
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(u64);

impl RecordId {
    /// The null reference
    pub const NULL: RecordId = RecordId(u64::MAX);

    /// Wrap a concrete id
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Whether this is the null reference
    pub fn is_null(self) -> bool {
        self.0 == u64::MAX
    }

    /// The id, or `None` for the null reference
    pub fn get(self) -> Option<u64> {
        if self.is_null() { None } else { Some(self.0) }
    }

    /// The raw id value; `u64::MAX` for null
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::NULL
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(id) => write!(f, "#{}", id),
            None => f.write_str("#null"),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(id) => write!(f, "{}", id),
            None => f.write_str("null"),
        }
    }
}

/// Largest allocatable id for a pointer of `bits` width
pub const fn max_id_for_bits(bits: u32) -> u64 {
    (1u64 << bits) - 2
}

/// Split a pointer into its low 32 bits and `bits - 32` high bits
pub fn split_pointer(id: RecordId, bits: u32) -> Result<(u32, u8)> {
    let high_mask = (1u64 << (bits - 32)) - 1;
    match id.get() {
        None => Ok((u32::MAX, high_mask as u8)),
        Some(raw) if raw <= max_id_for_bits(bits) => {
            Ok((raw as u32, ((raw >> 32) & high_mask) as u8))
        }
        Some(raw) => Err(Error::storage(format!(
            "id {} does not fit a {}-bit pointer",
            raw, bits
        ))),
    }
}

/// Reassemble a pointer split by [`split_pointer`]
pub fn join_pointer(low: u32, high: u8, bits: u32) -> RecordId {
    let high_mask = (1u64 << (bits - 32)) - 1;
    let raw = u64::from(low) | ((u64::from(high) & high_mask) << 32);
    if raw == (1u64 << bits) - 1 {
        RecordId::NULL
    } else {
        RecordId(raw)
    }
}

pub(crate) fn get_u16(bytes: &[u8], offset: usize) -> u16 {
    let mut buf = [0u8; 2];
    buf.copy_from_slice(&bytes[offset..offset + 2]);
    u16::from_le_bytes(buf)
}

pub(crate) fn put_u16(bytes: &mut [u8], offset: usize, value: u16) {
    bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn get_u24(bytes: &[u8], offset: usize) -> u32 {
    u32::from(bytes[offset])
        | (u32::from(bytes[offset + 1]) << 8)
        | (u32::from(bytes[offset + 2]) << 16)
}

pub(crate) fn put_u24(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset] = value as u8;
    bytes[offset + 1] = (value >> 8) as u8;
    bytes[offset + 2] = (value >> 16) as u8;
}

pub(crate) fn get_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

pub(crate) fn put_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn get_u40(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf[..5].copy_from_slice(&bytes[offset..offset + 5]);
    u64::from_le_bytes(buf)
}

pub(crate) fn put_u40(bytes: &mut [u8], offset: usize, value: u64) {
    bytes[offset..offset + 5].copy_from_slice(&value.to_le_bytes()[..5]);
}

pub(crate) fn get_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

pub(crate) fn put_u64(bytes: &mut [u8], offset: usize, value: u64) {
    bytes[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

/// A decoded record
pub trait Record: Clone + fmt::Debug + Send + Sync + 'static {
    /// The record's id
    fn id(&self) -> u64;
    /// Liveness flag
    fn in_use(&self) -> bool;
    /// Set the liveness flag
    fn set_in_use(&mut self, in_use: bool);
}

/// Binary layout of one store's records
pub trait RecordFormat: Send + Sync + 'static {
    /// Decoded record type
    type Record: Record;

    /// Short store name used in messages
    fn name(&self) -> &'static str;

    /// Bytes per record slot
    fn record_size(&self) -> usize;

    /// Width of ids in this store, in bits
    fn id_bits(&self) -> u32;

    /// Largest allocatable id
    fn max_id(&self) -> u64 {
        max_id_for_bits(self.id_bits())
    }

    /// A fresh in-use record with every pointer null
    fn new_record(&self, id: u64) -> Self::Record;

    /// Decode a record slot
    fn decode(&self, id: u64, bytes: &[u8]) -> Result<Self::Record>;

    /// Encode a record into its slot, checking it fits the record size
    fn encode(&self, record: &Self::Record, bytes: &mut [u8]) -> Result<()>;
}
