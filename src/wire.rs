use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::HotelParkAuthSource;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability;
use crate::sql::{self, Column, ColumnType, Command, Filter, SqlError, Table};

/// One output value. Integers go out as INT8, text as VARCHAR.
enum Cell {
    Int(i64),
    Text(String),
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

impl From<usize> for Cell {
    fn from(v: usize) -> Self {
        Cell::Int(v as i64)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(v.to_string())
    }
}

fn city_row(info: &CityInfo) -> Vec<Cell> {
    let c = &info.city;
    vec![
        c.id.into(),
        c.name.as_str().into(),
        c.population.into(),
        c.created_at.into(),
        info.hotel_count.into(),
    ]
}

fn hotel_row(info: &HotelInfo) -> Vec<Cell> {
    let h = &info.hotel;
    vec![
        h.id.into(),
        h.city_id.into(),
        h.name.as_str().into(),
        h.stars.into(),
        h.created_at.into(),
        info.city_name.as_str().into(),
        info.garage_count.into(),
    ]
}

fn garage_row(info: &GarageInfo) -> Vec<Cell> {
    let g = &info.garage;
    vec![
        g.id.into(),
        g.hotel_id.into(),
        g.name.as_str().into(),
        g.capacity.into(),
        g.created_at.into(),
        info.hotel_name.as_str().into(),
        info.city_name.as_str().into(),
        info.car_count.into(),
        info.available_spaces.into(),
    ]
}

fn car_row(info: &CarInfo) -> Vec<Cell> {
    let c = &info.car;
    vec![
        c.id.into(),
        c.garage_id.into(),
        c.brand.as_str().into(),
        c.license_plate.as_str().into(),
        c.owner_name.as_str().into(),
        c.entry_time.into(),
        info.garage_name.as_str().into(),
        info.hotel_name.as_str().into(),
        info.city_name.as_str().into(),
    ]
}

fn spaces_row(s: &GarageSpaces) -> Vec<Cell> {
    vec![
        s.garage_id.into(),
        s.capacity.into(),
        s.occupied.into(),
        s.available.into(),
    ]
}

/// Field descriptions in the client's requested result format (text when
/// unspecified, as on the simple protocol).
fn schema(columns: &[Column], format: Option<&Format>) -> Vec<FieldInfo> {
    columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let ty = match c.ty {
                ColumnType::Int => Type::INT8,
                ColumnType::Text => Type::VARCHAR,
            };
            let field_format = format.map_or(FieldFormat::Text, |f| f.format_for(i));
            FieldInfo::new(c.name.into(), None, None, ty, field_format)
        })
        .collect()
}

/// Encode full rows, keeping only the `projection` columns in that order.
fn query_response(
    table: Table,
    projection: &[usize],
    rows: Vec<Vec<Cell>>,
    format: Option<&Format>,
) -> Response {
    let all = table.columns();
    let columns: Vec<Column> = projection.iter().map(|&i| all[i]).collect();
    let schema = Arc::new(schema(&columns, format));

    let encoded: Vec<PgWireResult<_>> = rows
        .into_iter()
        .map(|row| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            for &i in projection {
                match &row[i] {
                    Cell::Int(v) => encoder.encode_field(v)?,
                    Cell::Text(v) => encoder.encode_field(v)?,
                }
            }
            Ok(encoder.take_row())
        })
        .collect();

    Response::Query(QueryResponse::new(schema, stream::iter(encoded)))
}

fn full_projection(table: Table) -> Vec<usize> {
    (0..table.columns().len()).collect()
}

/// Either the written row (`RETURNING`) or a plain command tag.
fn write_response(
    table: Table,
    returning: bool,
    tag: &str,
    row: Vec<Cell>,
    format: Option<&Format>,
) -> Response {
    if returning {
        query_response(table, &full_projection(table), vec![row], format)
    } else {
        let tag = match tag {
            "INSERT" => Tag::new(tag).with_oid(0),
            _ => Tag::new(tag),
        };
        Response::Execution(tag.with_rows(1))
    }
}

pub struct HotelParkHandler {
    engine: Arc<Engine>,
    query_parser: Arc<HotelParkQueryParser>,
}

impl HotelParkHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(HotelParkQueryParser),
        }
    }

    /// Parse, execute and record metrics for one statement.
    async fn run(&self, sql_text: &str, format: Option<&Format>) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(sql_text).map_err(|e| {
            metrics::counter!(observability::QUERIES_TOTAL, "command" => "unparsed", "status" => "error")
                .increment(1);
            sql_err(e)
        })?;
        let label = observability::command_label(&cmd);
        let start = Instant::now();
        let result = self.execute_command(cmd, format).await;
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        result
    }

    async fn execute_command(
        &self,
        cmd: Command,
        format: Option<&Format>,
    ) -> PgWireResult<Response> {
        let engine = &self.engine;
        match cmd {
            Command::InsertCity { input, returning } => {
                let info = engine.create_city_returning(input).await.map_err(engine_err)?;
                Ok(write_response(Table::Cities, returning, "INSERT", city_row(&info), format))
            }
            Command::InsertHotel { input, returning } => {
                let info = engine.create_hotel_returning(input).await.map_err(engine_err)?;
                Ok(write_response(Table::Hotels, returning, "INSERT", hotel_row(&info), format))
            }
            Command::InsertGarage { input, returning } => {
                let info = engine.create_garage_returning(input).await.map_err(engine_err)?;
                Ok(write_response(Table::Garages, returning, "INSERT", garage_row(&info), format))
            }
            Command::InsertCar { input, returning } => {
                let info = engine.park_car_returning(input).await.map_err(engine_err)?;
                Ok(write_response(Table::Cars, returning, "INSERT", car_row(&info), format))
            }
            Command::UpdateCity { id, changes, returning } => {
                let info = engine.update_city_returning(id, changes).await.map_err(engine_err)?;
                Ok(write_response(Table::Cities, returning, "UPDATE", city_row(&info), format))
            }
            Command::UpdateHotel { id, changes, returning } => {
                let info = engine.update_hotel_returning(id, changes).await.map_err(engine_err)?;
                Ok(write_response(Table::Hotels, returning, "UPDATE", hotel_row(&info), format))
            }
            Command::UpdateGarage { id, changes, returning } => {
                let info = engine.update_garage_returning(id, changes).await.map_err(engine_err)?;
                Ok(write_response(Table::Garages, returning, "UPDATE", garage_row(&info), format))
            }
            Command::UpdateCar { id, changes, returning } => {
                let info = engine.update_car_returning(id, changes).await.map_err(engine_err)?;
                Ok(write_response(Table::Cars, returning, "UPDATE", car_row(&info), format))
            }
            Command::Delete { kind, id } => {
                let summary = match kind {
                    EntityKind::City => engine.delete_city(id).await,
                    EntityKind::Hotel => engine.delete_hotel(id).await,
                    EntityKind::Garage => engine.delete_garage(id).await,
                    EntityKind::Car => engine.remove_car(id).await,
                }
                .map_err(engine_err)?;
                tracing::debug!(%kind, id, cascaded = summary.total() - 1, "delete");
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::Select { table, filter, projection } => {
                let rows = self.select_rows(table, filter).await;
                Ok(query_response(table, &projection, rows, format))
            }
            Command::SelectGarageSpaces { garage_id, projection } => {
                let rows = match engine.garage_spaces(garage_id).await {
                    Ok(spaces) => vec![spaces_row(&spaces)],
                    Err(EngineError::NotFound(..)) => vec![],
                    Err(e) => return Err(engine_err(e)),
                };
                Ok(query_response(Table::GarageSpaces, &projection, rows, format))
            }
        }
    }

    /// A lookup that misses yields no rows, as in SQL.
    async fn select_rows(&self, table: Table, filter: Filter) -> Vec<Vec<Cell>> {
        let engine = &self.engine;
        match (table, filter) {
            (Table::Cities, Filter::All) => engine.list_cities().await.iter().map(city_row).collect(),
            (Table::Cities, Filter::Id(id)) => engine.get_city(id).await.iter().map(city_row).collect(),
            (Table::Hotels, Filter::All) => engine.list_hotels().await.iter().map(hotel_row).collect(),
            (Table::Hotels, Filter::Id(id)) => engine.get_hotel(id).await.iter().map(hotel_row).collect(),
            (Table::Hotels, Filter::Parent(city_id)) => engine
                .list_hotels_by_city(city_id)
                .await
                .iter()
                .map(hotel_row)
                .collect(),
            (Table::Garages, Filter::All) => engine.list_garages().await.iter().map(garage_row).collect(),
            (Table::Garages, Filter::Id(id)) => engine.get_garage(id).await.iter().map(garage_row).collect(),
            (Table::Garages, Filter::Parent(hotel_id)) => engine
                .list_garages_by_hotel(hotel_id)
                .await
                .iter()
                .map(garage_row)
                .collect(),
            (Table::Cars, Filter::All) => engine.list_cars().await.iter().map(car_row).collect(),
            (Table::Cars, Filter::Id(id)) => engine.get_car(id).await.iter().map(car_row).collect(),
            (Table::Cars, Filter::Parent(garage_id)) => engine
                .list_cars_by_garage(garage_id)
                .await
                .iter()
                .map(car_row)
                .collect(),
            (Table::Cars, Filter::Plate(plate)) => {
                engine.get_car_by_plate(&plate).await.iter().map(car_row).collect()
            }
            // The parser only produces the combinations above.
            _ => vec![],
        }
    }
}

#[async_trait]
impl SimpleQueryHandler for HotelParkHandler {
    async fn do_query<C>(
        &self,
        _client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(vec![self.run(query, None).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct HotelParkQueryParser;

#[async_trait]
impl QueryParser for HotelParkQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(describe(stmt, column_format))
    }
}

#[async_trait]
impl ExtendedQueryHandler for HotelParkHandler {
    type Statement = String;
    type QueryParser = HotelParkQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        _client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = substitute_params(portal);
        self.run(&sql, Some(&portal.result_column_format)).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(param_types, describe(&target.statement, None)))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(describe(
            &target.statement.statement,
            Some(&target.result_column_format),
        )))
    }
}

/// Result columns of a statement that may still contain `$N` placeholders.
/// Placeholders are replaced by a dummy literal that every column parser
/// accepts; statements that do not parse describe as no rows.
fn describe(sql: &str, format: Option<&Format>) -> Vec<FieldInfo> {
    let text = rewrite_placeholders(sql, |_| Some("'0'".to_string()));
    match sql::parse_sql(&text) {
        Ok(cmd) => schema(&cmd.result_columns(), format),
        Err(_) => vec![],
    }
}

/// Byte range and number of every `$N` placeholder outside quoted literals.
fn placeholders(sql: &str) -> Vec<(std::ops::Range<usize>, usize)> {
    let bytes = sql.as_bytes();
    let mut found = Vec::new();
    let mut in_quote = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            // A doubled quote inside a literal toggles twice and stays quoted.
            b'\'' => {
                in_quote = !in_quote;
                i += 1;
            }
            b'$' if !in_quote => {
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if let Ok(n) = sql[start + 1..i].parse::<usize>() {
                    found.push((start..i, n));
                }
            }
            _ => i += 1,
        }
    }
    found
}

/// One pass over the original text. Values produced by `value_for` are never
/// scanned again. Placeholders it has no value for are left as written.
fn rewrite_placeholders(sql: &str, value_for: impl Fn(usize) -> Option<String>) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut last = 0;
    for (range, n) in placeholders(sql) {
        out.push_str(&sql[last..range.start]);
        match value_for(n) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&sql[range.clone()]),
        }
        last = range.end;
    }
    out.push_str(&sql[last..]);
    out
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    placeholders(sql).into_iter().map(|(_, n)| n).max().unwrap_or(0)
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    substitute(&portal.statement.statement, &portal.parameters)
}

fn substitute(sql: &str, params: &[Option<Bytes>]) -> String {
    rewrite_placeholders(sql, |n| {
        let param = params.get(n.checked_sub(1)?)?;
        Some(match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        })
    })
}

// ── Factory ──────────────────────────────────────────────────────

pub struct HotelParkFactory {
    handler: Arc<HotelParkHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<HotelParkAuthSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl HotelParkFactory {
    pub fn new(engine: Arc<Engine>, user: String, password: String) -> Self {
        let auth_source = HotelParkAuthSource::new(user, password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(HotelParkHandler::new(engine)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for HotelParkFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    user: String,
    password: String,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = HotelParkFactory::new(engine, user, password);
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Error mapping ────────────────────────────────────────────────

fn sqlstate_for_engine(e: &EngineError) -> &'static str {
    match e {
        EngineError::Validation { .. } => "22023",
        EngineError::NotFound(..) => "P0002",
        EngineError::InvalidParent(..) => "23503",
        EngineError::DuplicatePlate(_) => "23505",
        EngineError::GarageFull(_) => "23514",
        EngineError::LimitExceeded(_) => "54000",
        EngineError::WalError(_) => "58030",
    }
}

fn sqlstate_for_sql(e: &SqlError) -> &'static str {
    match e {
        SqlError::UnknownTable(_) => "42P01",
        SqlError::UnknownColumn(_) => "42703",
        SqlError::TooLong(_) => "54000",
        _ => "42601",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    if matches!(e, EngineError::WalError(_)) {
        tracing::error!(error = %e, "storage failure");
    }
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        sqlstate_for_engine(&e).into(),
        e.to_string(),
    )))
}

fn sql_err(e: SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        sqlstate_for_sql(&e).into(),
        e.to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_params_finds_highest() {
        assert_eq!(count_params("SELECT * FROM cars"), 0);
        assert_eq!(count_params("SELECT * FROM cars WHERE id = $1"), 1);
        assert_eq!(
            count_params("INSERT INTO cars (garage_id, brand, license_plate) VALUES ($1, $3, $2)"),
            3
        );
        assert_eq!(count_params("UPDATE cars SET brand = $12 WHERE id = $1"), 12);
    }

    #[test]
    fn substitute_quotes_and_escapes() {
        let params = vec![
            Some(Bytes::from_static(b"7")),
            Some(Bytes::from_static(b"O'Hara")),
            None,
        ];
        let sql = substitute("VALUES ($1, $2, $3)", &params);
        assert_eq!(sql, "VALUES ('7', 'O''Hara', NULL)");
    }

    #[test]
    fn substitute_handles_double_digit_placeholders() {
        let params: Vec<_> = (1..=10)
            .map(|i| Some(Bytes::from(i.to_string())))
            .collect();
        let sql = substitute("$1 $10", &params);
        assert_eq!(sql, "'1' '10'");
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let params = vec![
            Some(Bytes::from_static(b"7")),
            Some(Bytes::from_static(b"Fiat")),
            Some(Bytes::from_static(b"PL$1")),
        ];
        let text = substitute(
            "INSERT INTO cars (garage_id, brand, license_plate) VALUES ($1, $2, $3)",
            &params,
        );
        assert_eq!(
            text,
            "INSERT INTO cars (garage_id, brand, license_plate) VALUES ('7', 'Fiat', 'PL$1')"
        );
        match sql::parse_sql(&text).unwrap() {
            Command::InsertCar { input, .. } => {
                assert_eq!(input.garage_id, 7);
                assert_eq!(input.license_plate, "PL$1");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn placeholders_inside_literals_are_left_alone() {
        assert_eq!(count_params("SELECT * FROM cars WHERE license_plate = '$2'"), 0);
        let params = vec![Some(Bytes::from_static(b"X"))];
        assert_eq!(
            substitute("UPDATE cars SET owner_name = 'it''s $1', brand = $1 WHERE id = 3", &params),
            "UPDATE cars SET owner_name = 'it''s $1', brand = 'X' WHERE id = 3"
        );
        // Unbound placeholders stay as written and fail to parse later.
        assert_eq!(substitute("VALUES ($1, $2)", &params), "VALUES ('X', $2)");
    }

    #[test]
    fn describe_select_with_placeholder() {
        let fields = describe("SELECT * FROM cars WHERE garage_id = $1", None);
        assert_eq!(fields.len(), sql::parse_sql("SELECT * FROM cars").unwrap().result_columns().len());
        assert_eq!(fields[0].name(), "id");
        assert_eq!(fields[0].datatype(), &Type::INT8);
        assert_eq!(fields[2].datatype(), &Type::VARCHAR);
    }

    #[test]
    fn describe_write_without_returning_is_empty() {
        assert!(describe("INSERT INTO cities (name, population) VALUES ($1, $2)", None).is_empty());
        assert_eq!(
            describe("INSERT INTO cities (name, population) VALUES ($1, $2) RETURNING *", None).len(),
            5
        );
        assert!(describe("DELETE FROM cars WHERE id = $1", None).is_empty());
        assert!(describe("garbage", None).is_empty());
    }

    #[test]
    fn sqlstates_distinguish_domain_errors() {
        assert_eq!(sqlstate_for_engine(&EngineError::GarageFull(1)), "23514");
        assert_eq!(sqlstate_for_engine(&EngineError::DuplicatePlate("X".into())), "23505");
        assert_eq!(
            sqlstate_for_engine(&EngineError::InvalidParent(EntityKind::Garage, 1)),
            "23503"
        );
        assert_eq!(sqlstate_for_engine(&EngineError::NotFound(EntityKind::Car, 1)), "P0002");
        assert_eq!(sqlstate_for_engine(&EngineError::validation("name", "is required")), "22023");
        assert_eq!(sqlstate_for_sql(&SqlError::UnknownTable("x".into())), "42P01");
        assert_eq!(sqlstate_for_sql(&SqlError::Empty), "42601");
    }
}
