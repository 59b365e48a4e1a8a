use crate::model::*;

use super::store::Store;
use super::{capacity, Engine, EngineError};

// Projections resolve parent names through the store. A missing parent can only
// show up mid-replay, so it renders as an empty name rather than an error.

pub(super) fn city_info(store: &Store, city: &City) -> CityInfo {
    CityInfo {
        city: city.clone(),
        hotel_count: store.count_children(EntityKind::City, city.id),
    }
}

pub(super) fn hotel_info(store: &Store, hotel: &Hotel) -> HotelInfo {
    HotelInfo {
        hotel: hotel.clone(),
        city_name: store.city(hotel.city_id).map(|c| c.name.clone()).unwrap_or_default(),
        garage_count: store.count_children(EntityKind::Hotel, hotel.id),
    }
}

pub(super) fn garage_info(store: &Store, garage: &Garage) -> GarageInfo {
    let hotel = store.hotel(garage.hotel_id);
    let city = hotel.and_then(|h| store.city(h.city_id));
    GarageInfo {
        garage: garage.clone(),
        hotel_name: hotel.map(|h| h.name.clone()).unwrap_or_default(),
        city_name: city.map(|c| c.name.clone()).unwrap_or_default(),
        car_count: store.count_children(EntityKind::Garage, garage.id),
        available_spaces: capacity::available_spaces(store, garage.id),
    }
}

pub(super) fn car_info(store: &Store, car: &Car) -> CarInfo {
    let garage = store.garage(car.garage_id);
    let hotel = garage.and_then(|g| store.hotel(g.hotel_id));
    let city = hotel.and_then(|h| store.city(h.city_id));
    CarInfo {
        car: car.clone(),
        garage_name: garage.map(|g| g.name.clone()).unwrap_or_default(),
        hotel_name: hotel.map(|h| h.name.clone()).unwrap_or_default(),
        city_name: city.map(|c| c.name.clone()).unwrap_or_default(),
    }
}

impl Engine {
    // ── Cities ───────────────────────────────────────────

    pub async fn get_city(&self, id: Id) -> Result<CityInfo, EngineError> {
        let store = self.store.read().await;
        let city = store.city(id).ok_or(EngineError::NotFound(EntityKind::City, id))?;
        Ok(city_info(&store, city))
    }

    pub async fn list_cities(&self) -> Vec<CityInfo> {
        let store = self.store.read().await;
        store.cities().map(|c| city_info(&store, c)).collect()
    }

    // ── Hotels ───────────────────────────────────────────

    pub async fn get_hotel(&self, id: Id) -> Result<HotelInfo, EngineError> {
        let store = self.store.read().await;
        let hotel = store.hotel(id).ok_or(EngineError::NotFound(EntityKind::Hotel, id))?;
        Ok(hotel_info(&store, hotel))
    }

    pub async fn list_hotels(&self) -> Vec<HotelInfo> {
        let store = self.store.read().await;
        store.hotels().map(|h| hotel_info(&store, h)).collect()
    }

    /// Empty for an unknown city.
    pub async fn list_hotels_by_city(&self, city_id: Id) -> Vec<HotelInfo> {
        let store = self.store.read().await;
        store
            .children(EntityKind::City, city_id)
            .into_iter()
            .filter_map(|id| store.hotel(id))
            .map(|h| hotel_info(&store, h))
            .collect()
    }

    // ── Garages ──────────────────────────────────────────

    pub async fn get_garage(&self, id: Id) -> Result<GarageInfo, EngineError> {
        let store = self.store.read().await;
        let garage = store.garage(id).ok_or(EngineError::NotFound(EntityKind::Garage, id))?;
        Ok(garage_info(&store, garage))
    }

    pub async fn list_garages(&self) -> Vec<GarageInfo> {
        let store = self.store.read().await;
        store.garages().map(|g| garage_info(&store, g)).collect()
    }

    /// Empty for an unknown hotel.
    pub async fn list_garages_by_hotel(&self, hotel_id: Id) -> Vec<GarageInfo> {
        let store = self.store.read().await;
        store
            .children(EntityKind::Hotel, hotel_id)
            .into_iter()
            .filter_map(|id| store.garage(id))
            .map(|g| garage_info(&store, g))
            .collect()
    }

    /// Capacity minus parked cars; 0 for an unknown garage.
    pub async fn available_spaces(&self, garage_id: Id) -> i64 {
        let store = self.store.read().await;
        capacity::available_spaces(&store, garage_id)
    }

    pub async fn can_admit(&self, garage_id: Id) -> bool {
        let store = self.store.read().await;
        capacity::can_admit(&store, garage_id)
    }

    pub async fn garage_spaces(&self, garage_id: Id) -> Result<GarageSpaces, EngineError> {
        let store = self.store.read().await;
        capacity::spaces(&store, garage_id).ok_or(EngineError::NotFound(EntityKind::Garage, garage_id))
    }

    // ── Cars ─────────────────────────────────────────────

    pub async fn get_car(&self, id: Id) -> Result<CarInfo, EngineError> {
        let store = self.store.read().await;
        let car = store.car(id).ok_or(EngineError::NotFound(EntityKind::Car, id))?;
        Ok(car_info(&store, car))
    }

    /// Exact, case-sensitive plate match.
    pub async fn get_car_by_plate(&self, plate: &str) -> Option<CarInfo> {
        let store = self.store.read().await;
        store.find_by_plate(plate).map(|c| car_info(&store, c))
    }

    pub async fn list_cars(&self) -> Vec<CarInfo> {
        let store = self.store.read().await;
        store.cars().map(|c| car_info(&store, c)).collect()
    }

    /// Empty for an unknown garage.
    pub async fn list_cars_by_garage(&self, garage_id: Id) -> Vec<CarInfo> {
        let store = self.store.read().await;
        store
            .children(EntityKind::Garage, garage_id)
            .into_iter()
            .filter_map(|id| store.car(id))
            .map(|c| car_info(&store, c))
            .collect()
    }

    /// True if a car other than `exclude` already holds `plate`.
    pub async fn is_plate_taken(&self, plate: &str, exclude: Option<Id>) -> bool {
        let store = self.store.read().await;
        store.is_plate_taken(plate, exclude)
    }
}
