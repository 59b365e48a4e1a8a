use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::model::*;

use super::capacity;
use super::EngineError;

/// In-memory arena for the four tables plus the secondary indexes that make
/// foreign-key and plate lookups O(1).
///
/// The store never decides *whether* a mutation should happen; it checks the
/// storage-level constraints of an [`Event`] (`check`) and applies it (`apply`).
/// Callers hold the engine's write lock across both.
pub struct Store {
    cities: BTreeMap<Id, City>,
    hotels: BTreeMap<Id, Hotel>,
    garages: BTreeMap<Id, Garage>,
    cars: BTreeMap<Id, Car>,
    /// (parent kind, parent id) → child ids.
    children: HashMap<(EntityKind, Id), BTreeSet<Id>>,
    /// Unique index on `Car::license_plate`.
    plates: HashMap<String, Id>,
    /// Next id to hand out, per kind.
    next_ids: [Id; 4],
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            cities: BTreeMap::new(),
            hotels: BTreeMap::new(),
            garages: BTreeMap::new(),
            cars: BTreeMap::new(),
            children: HashMap::new(),
            plates: HashMap::new(),
            next_ids: [1; 4],
        }
    }

    // ── Point lookups ────────────────────────────────────────

    pub fn city(&self, id: Id) -> Option<&City> {
        self.cities.get(&id)
    }

    pub fn hotel(&self, id: Id) -> Option<&Hotel> {
        self.hotels.get(&id)
    }

    pub fn garage(&self, id: Id) -> Option<&Garage> {
        self.garages.get(&id)
    }

    pub fn car(&self, id: Id) -> Option<&Car> {
        self.cars.get(&id)
    }

    pub fn exists(&self, kind: EntityKind, id: Id) -> bool {
        match kind {
            EntityKind::City => self.cities.contains_key(&id),
            EntityKind::Hotel => self.hotels.contains_key(&id),
            EntityKind::Garage => self.garages.contains_key(&id),
            EntityKind::Car => self.cars.contains_key(&id),
        }
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::City => self.cities.len(),
            EntityKind::Hotel => self.hotels.len(),
            EntityKind::Garage => self.garages.len(),
            EntityKind::Car => self.cars.len(),
        }
    }

    pub fn next_id(&self, kind: EntityKind) -> Id {
        self.next_ids[kind.index()]
    }

    // ── Scans, in id order ───────────────────────────────────

    pub fn cities(&self) -> impl Iterator<Item = &City> {
        self.cities.values()
    }

    pub fn hotels(&self) -> impl Iterator<Item = &Hotel> {
        self.hotels.values()
    }

    pub fn garages(&self) -> impl Iterator<Item = &Garage> {
        self.garages.values()
    }

    pub fn cars(&self) -> impl Iterator<Item = &Car> {
        self.cars.values()
    }

    // ── Children index ───────────────────────────────────────

    fn add_child(&mut self, parent: EntityKind, parent_id: Id, child_id: Id) {
        self.children
            .entry((parent, parent_id))
            .or_default()
            .insert(child_id);
    }

    fn remove_child(&mut self, parent: EntityKind, parent_id: Id, child_id: Id) {
        if let Some(kids) = self.children.get_mut(&(parent, parent_id)) {
            kids.remove(&child_id);
            if kids.is_empty() {
                self.children.remove(&(parent, parent_id));
            }
        }
    }

    /// Ids of the rows directly owned by `(parent, parent_id)`, ascending.
    pub fn children(&self, parent: EntityKind, parent_id: Id) -> Vec<Id> {
        self.children
            .get(&(parent, parent_id))
            .map(|kids| kids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn count_children(&self, parent: EntityKind, parent_id: Id) -> usize {
        self.children
            .get(&(parent, parent_id))
            .map_or(0, |kids| kids.len())
    }

    // ── Plate index ──────────────────────────────────────────

    pub fn find_by_plate(&self, plate: &str) -> Option<&Car> {
        self.plates.get(plate).and_then(|id| self.cars.get(id))
    }

    /// True if some car other than `exclude` holds `plate`. Exact, case-sensitive.
    pub fn is_plate_taken(&self, plate: &str, exclude: Option<Id>) -> bool {
        self.plates
            .get(plate)
            .is_some_and(|owner| Some(*owner) != exclude)
    }

    // ── Cascade ──────────────────────────────────────────────

    /// Rows a delete of `(kind, id)` would remove, root included.
    pub fn subtree(&self, kind: EntityKind, id: Id) -> DeleteSummary {
        let mut summary = DeleteSummary::default();
        if !self.exists(kind, id) {
            return summary;
        }
        match kind {
            EntityKind::City => {
                summary.cities += 1;
                for hotel_id in self.children(EntityKind::City, id) {
                    let sub = self.subtree(EntityKind::Hotel, hotel_id);
                    summary.hotels += sub.hotels;
                    summary.garages += sub.garages;
                    summary.cars += sub.cars;
                }
            }
            EntityKind::Hotel => {
                summary.hotels += 1;
                for garage_id in self.children(EntityKind::Hotel, id) {
                    summary.garages += 1;
                    summary.cars += self.count_children(EntityKind::Garage, garage_id);
                }
            }
            EntityKind::Garage => {
                summary.garages += 1;
                summary.cars += self.count_children(EntityKind::Garage, id);
            }
            EntityKind::Car => summary.cars += 1,
        }
        summary
    }

    // ── Constraint check ─────────────────────────────────────

    /// Storage-level constraints for `event`: foreign keys, plate uniqueness,
    /// garage capacity, and existence of update/delete targets.
    pub fn check(&self, event: &Event) -> Result<(), EngineError> {
        match event {
            Event::CityCreated(_) | Event::SequenceAdvanced { .. } => Ok(()),
            Event::CityUpdated(city) => self.require(EntityKind::City, city.id),
            Event::CityDeleted { id } => self.require(EntityKind::City, *id),
            Event::HotelCreated(hotel) => self.require_parent(EntityKind::City, hotel.city_id),
            Event::HotelUpdated(hotel) => {
                self.require(EntityKind::Hotel, hotel.id)?;
                self.require_parent(EntityKind::City, hotel.city_id)
            }
            Event::HotelDeleted { id } => self.require(EntityKind::Hotel, *id),
            Event::GarageCreated(garage) => {
                self.require_parent(EntityKind::Hotel, garage.hotel_id)
            }
            Event::GarageUpdated(garage) => {
                self.require(EntityKind::Garage, garage.id)?;
                self.require_parent(EntityKind::Hotel, garage.hotel_id)
            }
            Event::GarageDeleted { id } => self.require(EntityKind::Garage, *id),
            Event::CarParked(car) => {
                self.require_parent(EntityKind::Garage, car.garage_id)?;
                if self.is_plate_taken(&car.license_plate, None) {
                    return Err(EngineError::DuplicatePlate(car.license_plate.clone()));
                }
                capacity::check_admission(self, car.garage_id)
            }
            Event::CarUpdated(car) => {
                self.require(EntityKind::Car, car.id)?;
                self.require_parent(EntityKind::Garage, car.garage_id)?;
                if self.is_plate_taken(&car.license_plate, Some(car.id)) {
                    return Err(EngineError::DuplicatePlate(car.license_plate.clone()));
                }
                Ok(())
            }
            Event::CarRemoved { id } => self.require(EntityKind::Car, *id),
            Event::CarRestored(car) => {
                self.require_parent(EntityKind::Garage, car.garage_id)?;
                if self.is_plate_taken(&car.license_plate, None) {
                    return Err(EngineError::DuplicatePlate(car.license_plate.clone()));
                }
                Ok(())
            }
        }
    }

    fn require(&self, kind: EntityKind, id: Id) -> Result<(), EngineError> {
        if self.exists(kind, id) {
            Ok(())
        } else {
            Err(EngineError::NotFound(kind, id))
        }
    }

    fn require_parent(&self, kind: EntityKind, id: Id) -> Result<(), EngineError> {
        if self.exists(kind, id) {
            Ok(())
        } else {
            Err(EngineError::InvalidParent(kind, id))
        }
    }

    // ── Event application ────────────────────────────────────

    /// Apply an event that has passed [`Store::check`].
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::CityCreated(city) => {
                self.bump_sequence(EntityKind::City, city.id);
                self.cities.insert(city.id, city.clone());
            }
            Event::CityUpdated(city) => {
                self.cities.insert(city.id, city.clone());
            }
            Event::CityDeleted { id } => self.remove_city(*id),
            Event::HotelCreated(hotel) => {
                self.bump_sequence(EntityKind::Hotel, hotel.id);
                self.add_child(EntityKind::City, hotel.city_id, hotel.id);
                self.hotels.insert(hotel.id, hotel.clone());
            }
            Event::HotelUpdated(hotel) => {
                let old = self.hotels.get(&hotel.id).map(|h| h.city_id);
                if let Some(old) = old.filter(|old| *old != hotel.city_id) {
                    self.remove_child(EntityKind::City, old, hotel.id);
                    self.add_child(EntityKind::City, hotel.city_id, hotel.id);
                }
                self.hotels.insert(hotel.id, hotel.clone());
            }
            Event::HotelDeleted { id } => self.remove_hotel(*id),
            Event::GarageCreated(garage) => {
                self.bump_sequence(EntityKind::Garage, garage.id);
                self.add_child(EntityKind::Hotel, garage.hotel_id, garage.id);
                self.garages.insert(garage.id, garage.clone());
            }
            Event::GarageUpdated(garage) => {
                let old = self.garages.get(&garage.id).map(|g| g.hotel_id);
                if let Some(old) = old.filter(|old| *old != garage.hotel_id) {
                    self.remove_child(EntityKind::Hotel, old, garage.id);
                    self.add_child(EntityKind::Hotel, garage.hotel_id, garage.id);
                }
                self.garages.insert(garage.id, garage.clone());
            }
            Event::GarageDeleted { id } => self.remove_garage(*id),
            Event::CarParked(car) | Event::CarRestored(car) => {
                self.bump_sequence(EntityKind::Car, car.id);
                self.add_child(EntityKind::Garage, car.garage_id, car.id);
                self.plates.insert(car.license_plate.clone(), car.id);
                self.cars.insert(car.id, car.clone());
            }
            Event::CarUpdated(car) => {
                if let Some(old) = self.cars.get(&car.id).cloned() {
                    if old.garage_id != car.garage_id {
                        self.remove_child(EntityKind::Garage, old.garage_id, car.id);
                        self.add_child(EntityKind::Garage, car.garage_id, car.id);
                    }
                    if old.license_plate != car.license_plate {
                        self.plates.remove(&old.license_plate);
                        self.plates.insert(car.license_plate.clone(), car.id);
                    }
                }
                self.cars.insert(car.id, car.clone());
            }
            Event::CarRemoved { id } => self.remove_car(*id),
            Event::SequenceAdvanced { kind, next } => {
                let slot = &mut self.next_ids[kind.index()];
                *slot = (*slot).max(*next);
            }
        }
    }

    fn bump_sequence(&mut self, kind: EntityKind, used: Id) {
        let slot = &mut self.next_ids[kind.index()];
        if *slot <= used {
            *slot = used + 1;
        }
    }

    fn remove_city(&mut self, id: Id) {
        for hotel_id in self.children(EntityKind::City, id) {
            self.remove_hotel(hotel_id);
        }
        self.children.remove(&(EntityKind::City, id));
        self.cities.remove(&id);
    }

    fn remove_hotel(&mut self, id: Id) {
        for garage_id in self.children(EntityKind::Hotel, id) {
            self.remove_garage(garage_id);
        }
        self.children.remove(&(EntityKind::Hotel, id));
        if let Some(hotel) = self.hotels.remove(&id) {
            self.remove_child(EntityKind::City, hotel.city_id, id);
        }
    }

    fn remove_garage(&mut self, id: Id) {
        for car_id in self.children(EntityKind::Garage, id) {
            self.remove_car(car_id);
        }
        self.children.remove(&(EntityKind::Garage, id));
        if let Some(garage) = self.garages.remove(&id) {
            self.remove_child(EntityKind::Hotel, garage.hotel_id, id);
        }
    }

    fn remove_car(&mut self, id: Id) {
        if let Some(car) = self.cars.remove(&id) {
            if self.plates.get(&car.license_plate) == Some(&id) {
                self.plates.remove(&car.license_plate);
            }
            self.remove_child(EntityKind::Garage, car.garage_id, id);
        }
    }

    // ── Compaction ───────────────────────────────────────────

    /// Minimal event list that rebuilds this store, sequences included.
    /// Parents always precede their children. Cars come back as
    /// `CarRestored`, so over-full garages survive the rebuild.
    pub fn snapshot(&self) -> Vec<Event> {
        let mut events = Vec::with_capacity(
            4 + self.cities.len() + self.hotels.len() + self.garages.len() + self.cars.len(),
        );
        for kind in EntityKind::ALL {
            events.push(Event::SequenceAdvanced {
                kind,
                next: self.next_id(kind),
            });
        }
        events.extend(self.cities.values().cloned().map(Event::CityCreated));
        events.extend(self.hotels.values().cloned().map(Event::HotelCreated));
        events.extend(self.garages.values().cloned().map(Event::GarageCreated));
        events.extend(self.cars.values().cloned().map(Event::CarRestored));
        events
    }
}
