use tracing::debug;

use crate::limits::MAX_ROWS_PER_TABLE;
use crate::model::*;

use super::store::Store;
use super::{capacity, queries, validate, Engine, EngineError};

fn check_row_limit(store: &Store, kind: EntityKind) -> Result<(), EngineError> {
    if store.len(kind) >= MAX_ROWS_PER_TABLE {
        return Err(EngineError::LimitExceeded("too many rows in table"));
    }
    Ok(())
}

fn require_parent(store: &Store, kind: EntityKind, id: Id) -> Result<(), EngineError> {
    if store.exists(kind, id) {
        Ok(())
    } else {
        Err(EngineError::InvalidParent(kind, id))
    }
}

fn reject_admission(err: EngineError) -> EngineError {
    metrics::counter!(crate::observability::ADMISSIONS_REJECTED_TOTAL, "reason" => err.kind_label())
        .increment(1);
    err
}

impl Engine {
    // ── Cities ───────────────────────────────────────────

    pub async fn create_city(&self, input: NewCity) -> Result<City, EngineError> {
        self.create_city_then(input, |_, city| city.clone()).await
    }

    /// Like [`Engine::create_city`], projected under the same write lock.
    pub async fn create_city_returning(&self, input: NewCity) -> Result<CityInfo, EngineError> {
        self.create_city_then(input, queries::city_info).await
    }

    async fn create_city_then<T>(
        &self,
        input: NewCity,
        project: impl FnOnce(&Store, &City) -> T + Send,
    ) -> Result<T, EngineError> {
        validate::city_name(&input.name)?;
        validate::population(input.population)?;

        let mut store = self.store.write().await;
        check_row_limit(&store, EntityKind::City)?;
        let city = City {
            id: store.next_id(EntityKind::City),
            name: input.name,
            population: input.population,
            created_at: self.clock.now_ms(),
        };
        self.commit(&mut store, Event::CityCreated(city.clone())).await?;
        Ok(project(&*store, &city))
    }

    pub async fn update_city(&self, id: Id, changes: CityChanges) -> Result<City, EngineError> {
        self.update_city_then(id, changes, |_, city| city.clone()).await
    }

    /// Like [`Engine::update_city`], projected under the same write lock.
    pub async fn update_city_returning(&self, id: Id, changes: CityChanges) -> Result<CityInfo, EngineError> {
        self.update_city_then(id, changes, queries::city_info).await
    }

    async fn update_city_then<T>(
        &self,
        id: Id,
        changes: CityChanges,
        project: impl FnOnce(&Store, &City) -> T + Send,
    ) -> Result<T, EngineError> {
        if let Some(name) = &changes.name {
            validate::city_name(name)?;
        }
        if let Some(population) = changes.population {
            validate::population(population)?;
        }

        let mut store = self.store.write().await;
        let mut city = store
            .city(id)
            .cloned()
            .ok_or(EngineError::NotFound(EntityKind::City, id))?;
        if let Some(name) = changes.name {
            city.name = name;
        }
        if let Some(population) = changes.population {
            city.population = population;
        }
        self.commit(&mut store, Event::CityUpdated(city.clone())).await?;
        Ok(project(&*store, &city))
    }

    /// Delete a city with all of its hotels, their garages and parked cars.
    pub async fn delete_city(&self, id: Id) -> Result<DeleteSummary, EngineError> {
        self.delete(EntityKind::City, id, Event::CityDeleted { id }).await
    }

    // ── Hotels ───────────────────────────────────────────

    pub async fn create_hotel(&self, input: NewHotel) -> Result<Hotel, EngineError> {
        self.create_hotel_then(input, |_, hotel| hotel.clone()).await
    }

    /// Like [`Engine::create_hotel`], projected under the same write lock.
    pub async fn create_hotel_returning(&self, input: NewHotel) -> Result<HotelInfo, EngineError> {
        self.create_hotel_then(input, queries::hotel_info).await
    }

    async fn create_hotel_then<T>(
        &self,
        input: NewHotel,
        project: impl FnOnce(&Store, &Hotel) -> T + Send,
    ) -> Result<T, EngineError> {
        validate::hotel_name(&input.name)?;

        let mut store = self.store.write().await;
        require_parent(&store, EntityKind::City, input.city_id)?;
        check_row_limit(&store, EntityKind::Hotel)?;
        let hotel = Hotel {
            id: store.next_id(EntityKind::Hotel),
            city_id: input.city_id,
            name: input.name,
            stars: input.stars,
            created_at: self.clock.now_ms(),
        };
        self.commit(&mut store, Event::HotelCreated(hotel.clone())).await?;
        Ok(project(&*store, &hotel))
    }

    pub async fn update_hotel(&self, id: Id, changes: HotelChanges) -> Result<Hotel, EngineError> {
        self.update_hotel_then(id, changes, |_, hotel| hotel.clone()).await
    }

    /// Like [`Engine::update_hotel`], projected under the same write lock.
    pub async fn update_hotel_returning(&self, id: Id, changes: HotelChanges) -> Result<HotelInfo, EngineError> {
        self.update_hotel_then(id, changes, queries::hotel_info).await
    }

    async fn update_hotel_then<T>(
        &self,
        id: Id,
        changes: HotelChanges,
        project: impl FnOnce(&Store, &Hotel) -> T + Send,
    ) -> Result<T, EngineError> {
        if let Some(name) = &changes.name {
            validate::hotel_name(name)?;
        }

        let mut store = self.store.write().await;
        let mut hotel = store
            .hotel(id)
            .cloned()
            .ok_or(EngineError::NotFound(EntityKind::Hotel, id))?;
        if let Some(city_id) = changes.city_id {
            hotel.city_id = city_id;
        }
        require_parent(&store, EntityKind::City, hotel.city_id)?;
        if let Some(name) = changes.name {
            hotel.name = name;
        }
        if let Some(stars) = changes.stars {
            hotel.stars = stars;
        }
        self.commit(&mut store, Event::HotelUpdated(hotel.clone())).await?;
        Ok(project(&*store, &hotel))
    }

    pub async fn delete_hotel(&self, id: Id) -> Result<DeleteSummary, EngineError> {
        self.delete(EntityKind::Hotel, id, Event::HotelDeleted { id }).await
    }

    // ── Garages ──────────────────────────────────────────

    pub async fn create_garage(&self, input: NewGarage) -> Result<Garage, EngineError> {
        self.create_garage_then(input, |_, garage| garage.clone()).await
    }

    /// Like [`Engine::create_garage`], projected under the same write lock.
    pub async fn create_garage_returning(&self, input: NewGarage) -> Result<GarageInfo, EngineError> {
        self.create_garage_then(input, queries::garage_info).await
    }

    async fn create_garage_then<T>(
        &self,
        input: NewGarage,
        project: impl FnOnce(&Store, &Garage) -> T + Send,
    ) -> Result<T, EngineError> {
        validate::garage_name(&input.name)?;
        validate::capacity(input.capacity)?;

        let mut store = self.store.write().await;
        require_parent(&store, EntityKind::Hotel, input.hotel_id)?;
        check_row_limit(&store, EntityKind::Garage)?;
        let garage = Garage {
            id: store.next_id(EntityKind::Garage),
            hotel_id: input.hotel_id,
            name: input.name,
            capacity: input.capacity,
            created_at: self.clock.now_ms(),
        };
        self.commit(&mut store, Event::GarageCreated(garage.clone())).await?;
        Ok(project(&*store, &garage))
    }

    /// Capacity may be lowered below the number of parked cars; nobody is
    /// evicted, the garage simply admits no one until cars leave.
    pub async fn update_garage(&self, id: Id, changes: GarageChanges) -> Result<Garage, EngineError> {
        self.update_garage_then(id, changes, |_, garage| garage.clone()).await
    }

    /// Like [`Engine::update_garage`], projected under the same write lock.
    pub async fn update_garage_returning(&self, id: Id, changes: GarageChanges) -> Result<GarageInfo, EngineError> {
        self.update_garage_then(id, changes, queries::garage_info).await
    }

    async fn update_garage_then<T>(
        &self,
        id: Id,
        changes: GarageChanges,
        project: impl FnOnce(&Store, &Garage) -> T + Send,
    ) -> Result<T, EngineError> {
        if let Some(name) = &changes.name {
            validate::garage_name(name)?;
        }
        if let Some(capacity) = changes.capacity {
            validate::capacity(capacity)?;
        }

        let mut store = self.store.write().await;
        let mut garage = store
            .garage(id)
            .cloned()
            .ok_or(EngineError::NotFound(EntityKind::Garage, id))?;
        if let Some(hotel_id) = changes.hotel_id {
            garage.hotel_id = hotel_id;
        }
        require_parent(&store, EntityKind::Hotel, garage.hotel_id)?;
        if let Some(name) = changes.name {
            garage.name = name;
        }
        if let Some(capacity) = changes.capacity {
            garage.capacity = capacity;
        }
        self.commit(&mut store, Event::GarageUpdated(garage.clone())).await?;
        Ok(project(&*store, &garage))
    }

    pub async fn delete_garage(&self, id: Id) -> Result<DeleteSummary, EngineError> {
        self.delete(EntityKind::Garage, id, Event::GarageDeleted { id }).await
    }

    // ── Cars ─────────────────────────────────────────────

    /// Admit a car: garage exists, plate unused, then a free space.
    pub async fn park_car(&self, input: NewCar) -> Result<Car, EngineError> {
        self.park_car_then(input, |_, car| car.clone()).await
    }

    /// Like [`Engine::park_car`], projected under the same write lock.
    pub async fn park_car_returning(&self, input: NewCar) -> Result<CarInfo, EngineError> {
        self.park_car_then(input, queries::car_info).await
    }

    async fn park_car_then<T>(
        &self,
        input: NewCar,
        project: impl FnOnce(&Store, &Car) -> T + Send,
    ) -> Result<T, EngineError> {
        validate::brand(&input.brand)?;
        validate::license_plate(&input.license_plate)?;
        validate::owner_name(&input.owner_name)?;

        let mut store = self.store.write().await;
        require_parent(&store, EntityKind::Garage, input.garage_id).map_err(reject_admission)?;
        if store.is_plate_taken(&input.license_plate, None) {
            return Err(reject_admission(EngineError::DuplicatePlate(input.license_plate)));
        }
        if let Err(e) = capacity::check_admission(&store, input.garage_id) {
            debug!(garage_id = input.garage_id, "garage full, car turned away");
            return Err(reject_admission(e));
        }
        check_row_limit(&store, EntityKind::Car)?;

        let car = Car {
            id: store.next_id(EntityKind::Car),
            garage_id: input.garage_id,
            brand: input.brand,
            license_plate: input.license_plate,
            owner_name: input.owner_name,
            entry_time: self.clock.now_ms(),
        };
        self.commit(&mut store, Event::CarParked(car.clone())).await?;
        metrics::counter!(crate::observability::CARS_PARKED_TOTAL).increment(1);
        Ok(project(&*store, &car))
    }

    /// Edit a parked car. Moving it to another garage does not re-check that
    /// garage's capacity. `entry_time` is kept.
    pub async fn update_car(&self, id: Id, changes: CarChanges) -> Result<Car, EngineError> {
        self.update_car_then(id, changes, |_, car| car.clone()).await
    }

    /// Like [`Engine::update_car`], projected under the same write lock.
    pub async fn update_car_returning(&self, id: Id, changes: CarChanges) -> Result<CarInfo, EngineError> {
        self.update_car_then(id, changes, queries::car_info).await
    }

    async fn update_car_then<T>(
        &self,
        id: Id,
        changes: CarChanges,
        project: impl FnOnce(&Store, &Car) -> T + Send,
    ) -> Result<T, EngineError> {
        if let Some(brand) = &changes.brand {
            validate::brand(brand)?;
        }
        if let Some(plate) = &changes.license_plate {
            validate::license_plate(plate)?;
        }
        if let Some(owner) = &changes.owner_name {
            validate::owner_name(owner)?;
        }

        let mut store = self.store.write().await;
        let mut car = store
            .car(id)
            .cloned()
            .ok_or(EngineError::NotFound(EntityKind::Car, id))?;
        if let Some(garage_id) = changes.garage_id {
            car.garage_id = garage_id;
        }
        require_parent(&store, EntityKind::Garage, car.garage_id)?;
        if let Some(plate) = changes.license_plate {
            if store.is_plate_taken(&plate, Some(id)) {
                return Err(EngineError::DuplicatePlate(plate));
            }
            car.license_plate = plate;
        }
        if let Some(brand) = changes.brand {
            car.brand = brand;
        }
        if let Some(owner) = changes.owner_name {
            car.owner_name = owner;
        }
        self.commit(&mut store, Event::CarUpdated(car.clone())).await?;
        Ok(project(&*store, &car))
    }

    pub async fn remove_car(&self, id: Id) -> Result<DeleteSummary, EngineError> {
        self.delete(EntityKind::Car, id, Event::CarRemoved { id }).await
    }

    // ── Shared delete path ───────────────────────────────

    async fn delete(&self, kind: EntityKind, id: Id, event: Event) -> Result<DeleteSummary, EngineError> {
        let mut store = self.store.write().await;
        if !store.exists(kind, id) {
            return Err(EngineError::NotFound(kind, id));
        }
        let summary = store.subtree(kind, id);
        self.commit(&mut store, event).await?;
        debug!(%kind, id, removed = summary.total(), "deleted");
        Ok(summary)
    }
}
