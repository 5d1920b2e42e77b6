use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::cp_entities::{CmmCpHits, CpmHits, CpmRoi, CpmTower, RodHeader, TriggerTower};
use super::error::StoreError;
use super::jep_entities::{CmmEtSums, CmmJetHits, CmmRoi, JemEtSums, JemHits, JemRoi, JetElement};

/// A named collection as held by the event store.
///
/// Serialized adjacently tagged so that run files read as
/// `{kind: CpmRois, items: [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items")]
pub enum Collection {
    TriggerTowers(Vec<TriggerTower>),
    CpmTowers(Vec<CpmTower>),
    CpmRois(Vec<CpmRoi>),
    CpmHits(Vec<CpmHits>),
    CmmCpHits(Vec<CmmCpHits>),
    RodHeaders(Vec<RodHeader>),
    JetElements(Vec<JetElement>),
    JemRois(Vec<JemRoi>),
    JemHits(Vec<JemHits>),
    JemEtSums(Vec<JemEtSums>),
    CmmJetHits(Vec<CmmJetHits>),
    CmmEtSums(Vec<CmmEtSums>),
    CmmRois(Vec<CmmRoi>),
    MismatchVector(Vec<u32>),
}

impl Collection {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TriggerTowers(_) => "TriggerTowers",
            Self::CpmTowers(_) => "CpmTowers",
            Self::CpmRois(_) => "CpmRois",
            Self::CpmHits(_) => "CpmHits",
            Self::CmmCpHits(_) => "CmmCpHits",
            Self::RodHeaders(_) => "RodHeaders",
            Self::JetElements(_) => "JetElements",
            Self::JemRois(_) => "JemRois",
            Self::JemHits(_) => "JemHits",
            Self::JemEtSums(_) => "JemEtSums",
            Self::CmmJetHits(_) => "CmmJetHits",
            Self::CmmEtSums(_) => "CmmEtSums",
            Self::CmmRois(_) => "CmmRois",
            Self::MismatchVector(_) => "MismatchVector",
        }
    }
}

/// Entity types that can be pulled out of a [`Collection`]
pub trait StoreEntity: Sized {
    const KIND: &'static str;
    fn from_collection(collection: &Collection) -> Option<&[Self]>;
    fn into_collection(items: Vec<Self>) -> Collection;
}

macro_rules! store_entity {
    ($entity:ty, $variant:ident) => {
        impl StoreEntity for $entity {
            const KIND: &'static str = stringify!($variant);

            fn from_collection(collection: &Collection) -> Option<&[Self]> {
                match collection {
                    Collection::$variant(items) => Some(items.as_slice()),
                    _ => None,
                }
            }

            fn into_collection(items: Vec<Self>) -> Collection {
                Collection::$variant(items)
            }
        }
    };
}

store_entity!(TriggerTower, TriggerTowers);
store_entity!(CpmTower, CpmTowers);
store_entity!(CpmRoi, CpmRois);
store_entity!(CpmHits, CpmHits);
store_entity!(CmmCpHits, CmmCpHits);
store_entity!(RodHeader, RodHeaders);
store_entity!(JetElement, JetElements);
store_entity!(JemRoi, JemRois);
store_entity!(JemHits, JemHits);
store_entity!(JemEtSums, JemEtSums);
store_entity!(CmmJetHits, CmmJetHits);
store_entity!(CmmEtSums, CmmEtSums);
store_entity!(CmmRoi, CmmRois);

/// The keyed event store the monitors read from and publish into.
///
/// Absence of a location is a normal outcome, never an error.
pub trait EventStore {
    fn event_number(&self) -> u64;
    fn retrieve(&self, location: &str) -> Option<&Collection>;
    fn publish(&mut self, location: &str, vector: Vec<u32>) -> Result<(), StoreError>;
}

/// Typed retrieval. A location holding a different kind of collection is reported and
/// treated as not found.
pub fn retrieve<'s, T, S>(store: &'s S, location: &str) -> Option<&'s [T]>
where
    T: StoreEntity,
    S: EventStore + ?Sized,
{
    let collection = store.retrieve(location)?;
    let items = T::from_collection(collection);
    if items.is_none() {
        spdlog::warn!(
            "{}",
            StoreError::WrongKind(location.to_string(), collection.kind(), T::KIND)
        );
    }
    items
}

/// In-memory event store, one per event.
///
/// This is what run files deserialize into.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    pub event_number: u64,
    #[serde(default)]
    collections: FxHashMap<String, Collection>,
}

impl MemoryStore {
    pub fn new(event_number: u64) -> Self {
        Self {
            event_number,
            collections: FxHashMap::default(),
        }
    }

    /// Record a collection; an existing collection at the same location is replaced
    pub fn record<T: StoreEntity>(&mut self, location: &str, items: Vec<T>) {
        self.collections
            .insert(location.to_string(), T::into_collection(items));
    }

    /// Builder-style [`MemoryStore::record`]
    pub fn with<T: StoreEntity>(mut self, location: &str, items: Vec<T>) -> Self {
        self.record(location, items);
        self
    }

    /// Read back a vector written by [`EventStore::publish`]
    pub fn published(&self, location: &str) -> Option<&[u32]> {
        match self.collections.get(location) {
            Some(Collection::MismatchVector(v)) => Some(v.as_slice()),
            _ => None,
        }
    }
}

impl EventStore for MemoryStore {
    fn event_number(&self) -> u64 {
        self.event_number
    }

    fn retrieve(&self, location: &str) -> Option<&Collection> {
        self.collections.get(location)
    }

    fn publish(&mut self, location: &str, vector: Vec<u32>) -> Result<(), StoreError> {
        if self.collections.contains_key(location) {
            return Err(StoreError::DuplicateLocation(location.to_string()));
        }
        self.collections
            .insert(location.to_string(), Collection::MismatchVector(vector));
        Ok(())
    }
}
