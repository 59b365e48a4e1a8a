use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "hotelpark_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "hotelpark_query_duration_seconds";

// ── Domain metrics ──────────────────────────────────────────────

/// Counter: cars admitted to a garage.
pub const CARS_PARKED_TOTAL: &str = "hotelpark_cars_parked_total";

/// Counter: park requests turned away. Labels: reason.
pub const ADMISSIONS_REJECTED_TOTAL: &str = "hotelpark_admissions_rejected_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "hotelpark_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "hotelpark_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "hotelpark_connections_rejected_total";

/// Counter: startup/auth failures.
pub const AUTH_FAILURES_TOTAL: &str = "hotelpark_auth_failures_total";

/// Histogram: WAL append + fsync duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "hotelpark_wal_flush_duration_seconds";

/// Counter: WAL compactions performed.
pub const WAL_COMPACTIONS_TOTAL: &str = "hotelpark_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertCity { .. } => "insert_city",
        Command::InsertHotel { .. } => "insert_hotel",
        Command::InsertGarage { .. } => "insert_garage",
        Command::InsertCar { .. } => "park_car",
        Command::UpdateCity { .. } => "update_city",
        Command::UpdateHotel { .. } => "update_hotel",
        Command::UpdateGarage { .. } => "update_garage",
        Command::UpdateCar { .. } => "update_car",
        Command::Delete { kind, .. } => match kind {
            crate::model::EntityKind::City => "delete_city",
            crate::model::EntityKind::Hotel => "delete_hotel",
            crate::model::EntityKind::Garage => "delete_garage",
            crate::model::EntityKind::Car => "remove_car",
        },
        Command::Select { table, .. } => match table {
            crate::sql::Table::Cities => "select_cities",
            crate::sql::Table::Hotels => "select_hotels",
            crate::sql::Table::Garages => "select_garages",
            crate::sql::Table::Cars => "select_cars",
            crate::sql::Table::GarageSpaces => "select_garage_spaces",
        },
        Command::SelectGarageSpaces { .. } => "select_garage_spaces",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parse_sql;

    #[test]
    fn labels_follow_the_operation() {
        let label = |sql: &str| command_label(&parse_sql(sql).unwrap());
        assert_eq!(label("INSERT INTO cars (garage_id, brand, license_plate) VALUES (1, 'a', 'b')"), "park_car");
        assert_eq!(label("DELETE FROM cars WHERE id = 1"), "remove_car");
        assert_eq!(label("DELETE FROM cities WHERE id = 1"), "delete_city");
        assert_eq!(label("SELECT * FROM garage_spaces WHERE garage_id = 1"), "select_garage_spaces");
        assert_eq!(label("UPDATE hotels SET stars = 5 WHERE id = 1"), "update_hotel");
    }

    #[test]
    fn init_without_port_is_noop() {
        assert!(init(None).is_ok());
    }
}
