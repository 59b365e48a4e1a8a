use std::fmt;

use serde::{Deserialize, Serialize};

/// Unix milliseconds, UTC.
pub type Ms = i64;

/// Row identity. Assigned by the store, starts at 1, never reused.
pub type Id = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    City,
    Hotel,
    Garage,
    Car,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::City,
        EntityKind::Hotel,
        EntityKind::Garage,
        EntityKind::Car,
    ];

    /// The kind this one hangs off, if any.
    pub fn parent(self) -> Option<EntityKind> {
        match self {
            EntityKind::City => None,
            EntityKind::Hotel => Some(EntityKind::City),
            EntityKind::Garage => Some(EntityKind::Hotel),
            EntityKind::Car => Some(EntityKind::Garage),
        }
    }

    pub fn index(self) -> usize {
        match self {
            EntityKind::City => 0,
            EntityKind::Hotel => 1,
            EntityKind::Garage => 2,
            EntityKind::Car => 3,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::City => "city",
            EntityKind::Hotel => "hotel",
            EntityKind::Garage => "garage",
            EntityKind::Car => "car",
        })
    }
}

// ── Stored records ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    pub id: Id,
    pub name: String,
    pub population: i64,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hotel {
    pub id: Id,
    pub city_id: Id,
    pub name: String,
    pub stars: i64,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Garage {
    pub id: Id,
    pub hotel_id: Id,
    pub name: String,
    pub capacity: i64,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Car {
    pub id: Id,
    pub garage_id: Id,
    pub brand: String,
    pub license_plate: String,
    pub owner_name: String,
    /// Set once when the car is parked.
    pub entry_time: Ms,
}

// ── Mutation inputs ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCity {
    pub name: String,
    pub population: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHotel {
    pub city_id: Id,
    pub name: String,
    pub stars: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGarage {
    pub hotel_id: Id,
    pub name: String,
    pub capacity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCar {
    pub garage_id: Id,
    pub brand: String,
    pub license_plate: String,
    pub owner_name: String,
}

/// Patch for an existing city. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CityChanges {
    pub name: Option<String>,
    pub population: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HotelChanges {
    pub city_id: Option<Id>,
    pub name: Option<String>,
    pub stars: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GarageChanges {
    pub hotel_id: Option<Id>,
    pub name: Option<String>,
    pub capacity: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CarChanges {
    pub garage_id: Option<Id>,
    pub brand: Option<String>,
    pub license_plate: Option<String>,
    pub owner_name: Option<String>,
}

impl From<NewCar> for CarChanges {
    fn from(car: NewCar) -> Self {
        Self {
            garage_id: Some(car.garage_id),
            brand: Some(car.brand),
            license_plate: Some(car.license_plate),
            owner_name: Some(car.owner_name),
        }
    }
}

// ── WAL record format ────────────────────────────────────────────

/// One committed mutation. Deletes carry only the root id; the cascade is
/// re-derived from the store when the event is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    CityCreated(City),
    CityUpdated(City),
    CityDeleted { id: Id },
    HotelCreated(Hotel),
    HotelUpdated(Hotel),
    HotelDeleted { id: Id },
    GarageCreated(Garage),
    GarageUpdated(Garage),
    GarageDeleted { id: Id },
    CarParked(Car),
    CarUpdated(Car),
    CarRemoved { id: Id },
    /// Written by compaction so deleted ids are not handed out again.
    SequenceAdvanced { kind: EntityKind, next: Id },
    /// A car written back by compaction. Admission is not re-run, since the
    /// garage may legitimately hold more cars than its current capacity.
    CarRestored(Car),
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityInfo {
    pub city: City,
    pub hotel_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotelInfo {
    pub hotel: Hotel,
    pub city_name: String,
    pub garage_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GarageInfo {
    pub garage: Garage,
    pub hotel_name: String,
    pub city_name: String,
    pub car_count: usize,
    pub available_spaces: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarInfo {
    pub car: Car,
    pub garage_name: String,
    pub hotel_name: String,
    pub city_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GarageSpaces {
    pub garage_id: Id,
    pub capacity: i64,
    pub occupied: usize,
    pub available: i64,
}

/// Rows removed by one delete, root included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    pub cities: usize,
    pub hotels: usize,
    pub garages: usize,
    pub cars: usize,
}

impl DeleteSummary {
    pub fn total(&self) -> usize {
        self.cities + self.hotels + self.garages + self.cars
    }
}

// ── Clock ────────────────────────────────────────────────────────

/// Source of creation and entry timestamps.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Ms;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Ms {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as Ms)
            .unwrap_or(0)
    }
}
