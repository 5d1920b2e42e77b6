//! Canonical key space for merge comparison.
//!
//! Every stage maps its hardware and simulated entities onto the same `u32` key so the two
//! collections can be walked side by side in ascending key order, whatever their size or
//! order in the store.
use std::collections::BTreeMap;
use std::f64::consts::TAU;

use super::constants::*;

pub type EntityKey = u32;

/// Ordered map from key to an entity borrowed from its collection.
///
/// Built once per stage per event and thrown away after the comparison. Two entities on
/// the same key overwrite each other: the last one inserted wins.
#[derive(Debug)]
pub struct KeyedEntityMap<'a, T> {
    map: BTreeMap<EntityKey, &'a T>,
    collisions: usize,
}

impl<'a, T> KeyedEntityMap<'a, T> {
    /// Key every entity of the collection. An absent collection gives an empty map.
    pub fn build<F>(collection: Option<&'a [T]>, key_fn: F) -> Self
    where
        F: Fn(&T) -> EntityKey,
    {
        Self::build_filtered(collection, |entity| Some(key_fn(entity)))
    }

    /// Like [`KeyedEntityMap::build`], but entities keyed to `None` do not take part
    pub fn build_filtered<F>(collection: Option<&'a [T]>, key_fn: F) -> Self
    where
        F: Fn(&T) -> Option<EntityKey>,
    {
        let mut map = BTreeMap::new();
        let mut collisions = 0;
        for entity in collection.unwrap_or_default() {
            if let Some(key) = key_fn(entity) {
                if map.insert(key, entity).is_some() {
                    collisions += 1;
                }
            }
        }
        if collisions > 0 {
            spdlog::debug!(
                "{collisions} key collision(s) while building entity map; last entity kept"
            );
        }
        Self { map, collisions }
    }

    pub fn get(&self, key: EntityKey) -> Option<&'a T> {
        self.map.get(&key).copied()
    }

    /// Entities in ascending key order
    pub fn iter(&self) -> impl Iterator<Item = (EntityKey, &'a T)> + '_ {
        self.map.iter().map(|(key, entity)| (*key, *entity))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Number of entities overwritten by a later one with the same key
    pub fn collisions(&self) -> usize {
        self.collisions
    }
}

/// Key of a module: `crate * modules_per_crate + module_index`
pub fn crate_module_key(
    crate_id: usize,
    module_index: usize,
    modules_per_crate: usize,
) -> EntityKey {
    (crate_id * modules_per_crate + module_index) as EntityKey
}

/// Key of a CMM readout entry: `crate * 100 + data_id`
pub fn cmm_key(crate_id: usize, data_id: usize) -> EntityKey {
    crate_id as EntityKey * CMM_KEY_STRIDE + data_id as EntityKey
}

/// Bucketed eta/phi grid turning a coordinate into a key.
///
/// Eta outside the grid is clamped to the edge bins; phi wraps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateKeyBuilder {
    pub eta_min: f64,
    pub eta_max: f64,
    pub eta_width: f64,
    pub phi_bins: u32,
}

/// Trigger tower grid of the CP system
pub const CP_TOWER_GRID: CoordinateKeyBuilder = CoordinateKeyBuilder {
    eta_min: CP_TOWER_ETA_MIN,
    eta_max: CP_TOWER_ETA_MAX,
    eta_width: CP_TOWER_ETA_WIDTH,
    phi_bins: CP_TOWER_PHI_BINS,
};

/// Jet element grid of the JEP system
pub const JET_ELEMENT_GRID: CoordinateKeyBuilder = CoordinateKeyBuilder {
    eta_min: JE_ETA_MIN,
    eta_max: JE_ETA_MAX,
    eta_width: JE_ETA_WIDTH,
    phi_bins: JE_PHI_BINS,
};

impl CoordinateKeyBuilder {
    pub fn eta_bins(&self) -> u32 {
        ((self.eta_max - self.eta_min) / self.eta_width).round() as u32
    }

    /// Whether eta lies inside the grid (without clamping)
    pub fn contains(&self, eta: f64) -> bool {
        eta >= self.eta_min && eta < self.eta_max
    }

    pub fn eta_bin(&self, eta: f64) -> u32 {
        let bin = ((eta - self.eta_min) / self.eta_width).floor();
        bin.clamp(0.0, (self.eta_bins() - 1) as f64) as u32
    }

    pub fn phi_bin(&self, phi: f64) -> u32 {
        let width = TAU / self.phi_bins as f64;
        let bin = (phi.rem_euclid(TAU) / width).floor() as u32;
        bin.min(self.phi_bins - 1)
    }

    pub fn key(&self, eta: f64, phi: f64) -> EntityKey {
        self.eta_bin(eta) * self.phi_bins + self.phi_bin(phi)
    }

    /// `(eta_bin, phi_bin)` of a key
    pub fn bins(&self, key: EntityKey) -> (u32, u32) {
        (key / self.phi_bins, key % self.phi_bins)
    }

    /// Centre of the bin a coordinate falls in
    pub fn centre(&self, eta: f64, phi: f64) -> (f64, f64) {
        let eta_c = self.eta_min + (self.eta_bin(eta) as f64 + 0.5) * self.eta_width;
        let phi_width = TAU / self.phi_bins as f64;
        let phi_c = (self.phi_bin(phi) as f64 + 0.5) * phi_width;
        (eta_c, phi_c)
    }
}

/// `(crate, cpm)` processing a CP trigger tower. CPMs are numbered from 1.
pub fn cpm_tower_location(eta: f64, phi: f64) -> (usize, usize) {
    let crate_id = (CP_TOWER_GRID.phi_bin(phi) as usize) / (CP_TOWER_PHI_BINS as usize / CP_CRATES);
    let module = ((eta - CPM_ETA_EDGE) / CPM_ETA_WIDTH).floor() as i64 + 1;
    (crate_id, module.clamp(1, CPM_MODULES as i64) as usize)
}

/// `(crate, jem)` processing a jet element.
///
/// Phi quadrant `q` is read out by crate `q % 2`; JEMs 0-7 cover the first quadrant of
/// a crate, 8-15 the second.
pub fn jem_element_location(eta: f64, phi: f64) -> (usize, usize) {
    let quadrant = JET_ELEMENT_GRID.phi_bin(phi) as usize / (JE_PHI_BINS as usize / 4);
    let eta_module = (JET_ELEMENT_GRID.eta_bin(eta) / JE_ETA_BINS_PER_JEM) as usize;
    (
        quadrant % JEP_CRATES,
        (quadrant / JEP_CRATES) * JEMS_PER_QUADRANT + eta_module,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_locations() {
        assert_eq!(cpm_tower_location(-2.45, 0.05), (0, 1));
        assert_eq!(cpm_tower_location(2.45, 6.2), (3, 14));
        assert_eq!(cpm_tower_location(0.05, 1.6), (1, 8));
        assert_eq!(jem_element_location(-3.1, 0.1), (0, 0));
        assert_eq!(jem_element_location(3.1, 1.7), (1, 7));
        assert_eq!(jem_element_location(0.1, 3.2), (0, 12));
        assert_eq!(jem_element_location(-0.1, 5.0), (1, 11));
    }

    #[derive(Debug, PartialEq)]
    struct Item {
        key: u32,
        value: u32,
    }

    fn items(pairs: &[(u32, u32)]) -> Vec<Item> {
        pairs
            .iter()
            .map(|(key, value)| Item {
                key: *key,
                value: *value,
            })
            .collect()
    }

    #[test]
    fn test_ascending_order() {
        let coll = items(&[(9, 1), (2, 2), (5, 3)]);
        let map = KeyedEntityMap::build(Some(&coll), |i| i.key);
        let keys: Vec<u32> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![2, 5, 9]);
    }

    #[test]
    fn test_absent_collection_is_empty() {
        let map = KeyedEntityMap::<Item>::build(None, |i| i.key);
        assert!(map.is_empty());
    }

    #[test]
    fn test_collision_last_wins() {
        let coll = items(&[(4, 1), (4, 2)]);
        let map = KeyedEntityMap::build(Some(&coll), |i| i.key);
        assert_eq!(map.len(), 1);
        assert_eq!(map.collisions(), 1);
        assert_eq!(map.get(4).unwrap().value, 2);
    }

    #[test]
    fn test_filtered_build() {
        let coll = items(&[(1, 1), (15, 2), (3, 3)]);
        let map = KeyedEntityMap::build_filtered(Some(&coll), |i| (i.key <= 14).then_some(i.key));
        assert_eq!(map.len(), 2);
        assert!(map.get(15).is_none());
    }

    #[test]
    fn test_composite_keys() {
        assert_eq!(crate_module_key(2, 5, 14), 33);
        assert_eq!(cmm_key(3, 18), 318);
    }

    #[test]
    fn test_coordinate_keys() {
        assert_eq!(CP_TOWER_GRID.eta_bins(), 50);
        assert_eq!(CP_TOWER_GRID.eta_bin(-2.45), 0);
        assert_eq!(CP_TOWER_GRID.eta_bin(2.45), 49);
        // Clamped
        assert_eq!(CP_TOWER_GRID.eta_bin(3.0), 49);
        assert_eq!(CP_TOWER_GRID.phi_bin(-0.01), 63);
        let key = CP_TOWER_GRID.key(0.05, 0.05);
        assert_eq!(CP_TOWER_GRID.bins(key), (25, 0));
        assert_eq!(JET_ELEMENT_GRID.eta_bins(), 32);
        let (eta, phi) = JET_ELEMENT_GRID.centre(0.15, 0.1);
        assert!((eta - 0.1).abs() < 1e-9);
        assert!((phi - TAU / 64.0).abs() < 1e-9);
    }
}
