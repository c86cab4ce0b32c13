//! H3 bucketing of driver positions for radius queries.
//!
//! Drivers are grouped by the H3 cell containing their last known location.
//! A radius query expands a grid disk around the center cell wide enough to
//! cover the radius; callers refine the returned ids by exact distance.
//!
//! Default resolution is 7 (~1.2 km edge), which keeps a 15 km search under a
//! thousand cells.

use std::collections::{HashMap, HashSet};

use h3o::{CellIndex, LatLng, Resolution};
use uuid::Uuid;

use crate::model::GeoPoint;

/// Above this many rings a query degrades to returning every indexed driver.
const MAX_RINGS: u32 = 120;

#[derive(Debug, Clone)]
pub struct DriverSpatialIndex {
    resolution: Resolution,
    drivers_by_cell: HashMap<CellIndex, Vec<Uuid>>,
    driver_to_cell: HashMap<Uuid, CellIndex>,
    /// Drivers whose location could not be mapped to a cell.
    unindexed: HashSet<Uuid>,
}

impl DriverSpatialIndex {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            drivers_by_cell: HashMap::new(),
            driver_to_cell: HashMap::new(),
            unindexed: HashSet::new(),
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn cell_for(&self, point: &GeoPoint) -> Option<CellIndex> {
        LatLng::new(point.latitude, point.longitude)
            .ok()
            .map(|ll| ll.to_cell(self.resolution))
    }

    /// Insert or move a driver.
    pub fn upsert(&mut self, driver_id: Uuid, location: &GeoPoint) {
        let new_cell = self.cell_for(location);
        if let (Some(old), Some(new)) = (self.driver_to_cell.get(&driver_id), new_cell) {
            if *old == new {
                return;
            }
        }
        self.remove(driver_id);
        match new_cell {
            Some(cell) => {
                self.drivers_by_cell.entry(cell).or_default().push(driver_id);
                self.driver_to_cell.insert(driver_id, cell);
            }
            None => {
                self.unindexed.insert(driver_id);
            }
        }
    }

    pub fn remove(&mut self, driver_id: Uuid) {
        self.unindexed.remove(&driver_id);
        if let Some(cell) = self.driver_to_cell.remove(&driver_id) {
            if let Some(ids) = self.drivers_by_cell.get_mut(&cell) {
                ids.retain(|id| *id != driver_id);
                if ids.is_empty() {
                    self.drivers_by_cell.remove(&cell);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.driver_to_cell.len() + self.unindexed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of grid rings whose disk covers `radius_km`.
    pub fn rings_for_radius(&self, radius_km: f64) -> u32 {
        let edge_km = self.resolution.edge_length_km();
        if radius_km <= 0.0 || edge_km <= 0.0 {
            return 0;
        }
        // Edge length is below the center-to-center spacing, so this over-covers.
        (radius_km / edge_km).ceil() as u32 + 1
    }

    /// Superset of drivers that may lie within `radius_km` of `center`.
    pub fn candidates_within(&self, center: &GeoPoint, radius_km: f64) -> Vec<Uuid> {
        let rings = self.rings_for_radius(radius_km);
        let Some(origin) = self.cell_for(center) else {
            return self.all();
        };
        if rings > MAX_RINGS {
            return self.all();
        }

        let mut result: Vec<Uuid> = origin
            .grid_disk::<Vec<_>>(rings)
            .into_iter()
            .filter_map(|cell| self.drivers_by_cell.get(&cell))
            .flat_map(|ids| ids.iter().copied())
            .collect();
        result.extend(self.unindexed.iter().copied());
        result
    }

    fn all(&self) -> Vec<Uuid> {
        self.driver_to_cell
            .keys()
            .chain(self.unindexed.iter())
            .copied()
            .collect()
    }
}

impl Default for DriverSpatialIndex {
    fn default() -> Self {
        Self::new(Resolution::Seven)
    }
}
