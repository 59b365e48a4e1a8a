use crate::model::{EntityKind, GarageSpaces, Id};

use super::store::Store;
use super::EngineError;

/// Capacity minus parked cars. Zero for an unknown garage; negative if the
/// capacity was lowered below the current occupancy.
pub(super) fn available_spaces(store: &Store, garage_id: Id) -> i64 {
    spaces(store, garage_id).map_or(0, |s| s.available)
}

pub(super) fn can_admit(store: &Store, garage_id: Id) -> bool {
    available_spaces(store, garage_id) > 0
}

pub(super) fn spaces(store: &Store, garage_id: Id) -> Option<GarageSpaces> {
    let garage = store.garage(garage_id)?;
    let occupied = store.count_children(EntityKind::Garage, garage_id);
    Some(GarageSpaces {
        garage_id,
        capacity: garage.capacity,
        occupied,
        available: garage.capacity - occupied as i64,
    })
}

/// Admission rule for parking one more car in `garage_id`.
pub(super) fn check_admission(store: &Store, garage_id: Id) -> Result<(), EngineError> {
    if can_admit(store, garage_id) {
        Ok(())
    } else {
        Err(EngineError::GarageFull(garage_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;

    fn store_with_garage(capacity: i64, parked: i64) -> Store {
        let mut store = Store::new();
        let mut events = vec![
            Event::CityCreated(City { id: 1, name: "Pella".into(), population: 0, created_at: 0 }),
            Event::HotelCreated(Hotel { id: 1, city_id: 1, name: "H".into(), stars: 4, created_at: 0 }),
            Event::GarageCreated(Garage { id: 1, hotel_id: 1, name: "G".into(), capacity: 10, created_at: 0 }),
        ];
        for i in 1..=parked {
            events.push(Event::CarParked(Car {
                id: i,
                garage_id: 1,
                brand: "Fiat".into(),
                license_plate: format!("P{i}"),
                owner_name: String::new(),
                entry_time: 0,
            }));
        }
        events.push(Event::GarageUpdated(Garage {
            id: 1,
            hotel_id: 1,
            name: "G".into(),
            capacity,
            created_at: 0,
        }));
        for e in &events {
            store.apply(e);
        }
        store
    }

    #[test]
    fn free_spaces() {
        let store = store_with_garage(2, 1);
        assert_eq!(available_spaces(&store, 1), 1);
        assert!(can_admit(&store, 1));
        assert!(check_admission(&store, 1).is_ok());
    }

    #[test]
    fn full_garage_rejects() {
        let store = store_with_garage(2, 2);
        assert_eq!(available_spaces(&store, 1), 0);
        assert_eq!(check_admission(&store, 1), Err(EngineError::GarageFull(1)));
    }

    #[test]
    fn zero_capacity_never_admits() {
        let store = store_with_garage(0, 0);
        assert!(!can_admit(&store, 1));
    }

    #[test]
    fn over_full_goes_negative() {
        let store = store_with_garage(1, 3);
        let s = spaces(&store, 1).unwrap();
        assert_eq!(s.occupied, 3);
        assert_eq!(s.available, -2);
        assert!(!can_admit(&store, 1));
    }

    #[test]
    fn unknown_garage_has_no_space() {
        let store = Store::new();
        assert_eq!(available_spaces(&store, 7), 0);
        assert!(spaces(&store, 7).is_none());
        assert_eq!(check_admission(&store, 7), Err(EngineError::GarageFull(7)));
    }
}
