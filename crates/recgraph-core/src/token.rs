//! Tokens: labels, property keys and relationship types
//!
//! Each token kind has a token store of fixed-size records pointing at the
//! token's UTF-8 name in a dynamic name store. A [`TokenHolder`] loads every
//! token on open and serves name ↔ id lookups from memory; creation is
//! serialized by a write lock and double-checked under it.

use crate::storage::dynamic::{allocate_chain, read_chain};
use crate::storage::format::{DynamicFormat, TokenFormat, TokenRecord};
use crate::storage::{RecordAccess, RecordStore};
use crate::{Error, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Id bits of property key tokens (the width of a block's key field)
pub const PROPERTY_KEY_ID_BITS: u32 = 24;
/// Id bits of relationship type tokens
pub const RELATIONSHIP_TYPE_ID_BITS: u32 = 16;
/// Id bits of label tokens; every 31-bit value is a valid label id
pub const LABEL_ID_BITS: u32 = 31;

/// Property keys: the all-ones key is reserved
pub const PROPERTY_KEY_CAPACITY: u64 = (1 << PROPERTY_KEY_ID_BITS) - 1;
/// Relationship types: the all-ones type is reserved
pub const RELATIONSHIP_TYPE_CAPACITY: u64 = (1 << RELATIONSHIP_TYPE_ID_BITS) - 1;
pub const LABEL_CAPACITY: u64 = 1 << LABEL_ID_BITS;

/// Kind of token a holder serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Label,
    PropertyKey,
    RelationshipType,
}

impl TokenKind {
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Label => "label",
            TokenKind::PropertyKey => "property key",
            TokenKind::RelationshipType => "relationship type",
        }
    }

    /// How many tokens of this kind can exist
    pub fn capacity(self) -> u64 {
        match self {
            TokenKind::Label => LABEL_CAPACITY,
            TokenKind::PropertyKey => PROPERTY_KEY_CAPACITY,
            TokenKind::RelationshipType => RELATIONSHIP_TYPE_CAPACITY,
        }
    }
}

/// In-memory view over one token store and its name store
pub struct TokenHolder {
    kind: TokenKind,
    tokens: Arc<RecordStore<TokenFormat>>,
    names: Arc<RecordStore<DynamicFormat>>,
    by_name: DashMap<String, u32>,
    by_id: DashMap<u32, String>,
    write_lock: Mutex<()>,
}

impl TokenHolder {
    /// Load every token from `tokens`, reading names from `names`
    pub fn open(
        kind: TokenKind,
        tokens: Arc<RecordStore<TokenFormat>>,
        names: Arc<RecordStore<DynamicFormat>>,
    ) -> Result<Self> {
        let holder = Self {
            kind,
            tokens,
            names,
            by_name: DashMap::new(),
            by_id: DashMap::new(),
            write_lock: Mutex::new(()),
        };

        let mut names = RecordAccess::new(holder.names.clone());
        for token in holder.tokens.iter_in_use() {
            let token = token?;
            let bytes = read_chain(&mut names, token.name)?;
            let name = String::from_utf8(bytes).map_err(|_| {
                Error::corruption(format!("{} {} has a non utf-8 name", kind.name(), token.id))
            })?;
            let id = token.id as u32;
            holder.by_name.insert(name.clone(), id);
            holder.by_id.insert(id, name);
        }
        tracing::debug!(kind = kind.name(), tokens = holder.by_id.len(), "loaded tokens");
        Ok(holder)
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    /// Id of `name`, if it exists
    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).map(|id| *id)
    }

    /// Name of token `id`, if it exists
    pub fn name_of(&self, id: u32) -> Option<String> {
        self.by_id.get(&id).map(|name| name.clone())
    }

    /// Id of `name`, creating the token when missing
    pub fn get_or_create(&self, name: &str) -> Result<u32> {
        if let Some(id) = self.id_of(name) {
            return Ok(id);
        }
        let _guard = self.write_lock.lock();
        if let Some(id) = self.id_of(name) {
            return Ok(id);
        }
        self.create_locked(name)
    }

    /// Create a token that must not exist yet
    ///
    /// Fails with [`Error::TransientFailure`] when `name` already exists,
    /// which happens when another writer created it first.
    pub fn create(&self, name: &str) -> Result<u32> {
        let _guard = self.write_lock.lock();
        if self.id_of(name).is_some() {
            return Err(Error::transient(format!(
                "{} '{}' was created concurrently",
                self.kind.name(),
                name
            )));
        }
        self.create_locked(name)
    }

    fn create_locked(&self, name: &str) -> Result<u32> {
        if name.is_empty() {
            return Err(Error::invalid_argument(format!(
                "{} name must not be empty",
                self.kind.name()
            )));
        }
        let id = self.tokens.next_id().map_err(|e| match e {
            Error::CapacityExceeded(_) => Error::constraint(format!(
                "cannot create {} '{}': all {} ids are in use",
                self.kind.name(),
                name,
                self.tokens.max_id() + 1
            )),
            other => other,
        })?;

        let mut names = RecordAccess::new(self.names.clone());
        let head = allocate_chain(&mut names, name.as_bytes())?;
        names.commit()?;
        self.tokens.update(&TokenRecord {
            id,
            in_use: true,
            name: head,
        })?;

        let id = id as u32;
        self.by_name.insert(name.to_string(), id);
        self.by_id.insert(id, name.to_string());
        tracing::debug!(kind = self.kind.name(), id, name, "created token");
        Ok(id)
    }

    /// Every `(id, name)`, ordered by id
    pub fn all(&self) -> Vec<(u32, String)> {
        let mut all: Vec<(u32, String)> = self
            .by_id
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        all.sort_unstable_by_key(|(id, _)| *id);
        all
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// The token and name stores, for flushing and statistics
    pub fn stores(&self) -> (&Arc<RecordStore<TokenFormat>>, &Arc<RecordStore<DynamicFormat>>) {
        (&self.tokens, &self.names)
    }
}
