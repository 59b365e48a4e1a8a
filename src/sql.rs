use std::collections::HashMap;

use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SelectItem, SetExpr, Statement,
    TableFactor, TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::limits::MAX_SQL_LEN;
use crate::model::*;

// ── Tables ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
}

const fn int(name: &'static str) -> Column {
    Column { name, ty: ColumnType::Int }
}

const fn text(name: &'static str) -> Column {
    Column { name, ty: ColumnType::Text }
}

const CITY_COLUMNS: &[Column] = &[
    int("id"),
    text("name"),
    int("population"),
    int("created_at"),
    int("hotel_count"),
];

const HOTEL_COLUMNS: &[Column] = &[
    int("id"),
    int("city_id"),
    text("name"),
    int("stars"),
    int("created_at"),
    text("city_name"),
    int("garage_count"),
];

const GARAGE_COLUMNS: &[Column] = &[
    int("id"),
    int("hotel_id"),
    text("name"),
    int("capacity"),
    int("created_at"),
    text("hotel_name"),
    text("city_name"),
    int("car_count"),
    int("available_spaces"),
];

const CAR_COLUMNS: &[Column] = &[
    int("id"),
    int("garage_id"),
    text("brand"),
    text("license_plate"),
    text("owner_name"),
    int("entry_time"),
    text("garage_name"),
    text("hotel_name"),
    text("city_name"),
];

const GARAGE_SPACES_COLUMNS: &[Column] = &[
    int("garage_id"),
    int("capacity"),
    int("occupied"),
    int("available"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Cities,
    Hotels,
    Garages,
    Cars,
    /// Read-only view over one garage's occupancy.
    GarageSpaces,
}

impl Table {
    fn from_name(name: &str) -> Option<Table> {
        match name {
            "cities" => Some(Table::Cities),
            "hotels" => Some(Table::Hotels),
            "garages" => Some(Table::Garages),
            "cars" => Some(Table::Cars),
            "garage_spaces" => Some(Table::GarageSpaces),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Table::Cities => "cities",
            Table::Hotels => "hotels",
            Table::Garages => "garages",
            Table::Cars => "cars",
            Table::GarageSpaces => "garage_spaces",
        }
    }

    pub fn kind(self) -> Option<EntityKind> {
        match self {
            Table::Cities => Some(EntityKind::City),
            Table::Hotels => Some(EntityKind::Hotel),
            Table::Garages => Some(EntityKind::Garage),
            Table::Cars => Some(EntityKind::Car),
            Table::GarageSpaces => None,
        }
    }

    /// Every column a full row of this table carries, in output order.
    pub fn columns(self) -> &'static [Column] {
        match self {
            Table::Cities => CITY_COLUMNS,
            Table::Hotels => HOTEL_COLUMNS,
            Table::Garages => GARAGE_COLUMNS,
            Table::Cars => CAR_COLUMNS,
            Table::GarageSpaces => GARAGE_SPACES_COLUMNS,
        }
    }

    /// Columns a client may set, in positional INSERT order.
    fn writable(self) -> &'static [&'static str] {
        match self {
            Table::Cities => &["name", "population"],
            Table::Hotels => &["city_id", "name", "stars"],
            Table::Garages => &["hotel_id", "name", "capacity"],
            Table::Cars => &["garage_id", "brand", "license_plate", "owner_name"],
            Table::GarageSpaces => &[],
        }
    }

    fn parent_column(self) -> Option<&'static str> {
        match self {
            Table::Hotels => Some("city_id"),
            Table::Garages => Some("hotel_id"),
            Table::Cars => Some("garage_id"),
            Table::Cities | Table::GarageSpaces => None,
        }
    }

    fn column_index(self, name: &str) -> Option<usize> {
        self.columns().iter().position(|c| c.name == name)
    }
}

// ── Commands ──────────────────────────────────────────────────

/// Row selection for a SELECT against an entity table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    All,
    Id(Id),
    /// Children of the given parent (`city_id`, `hotel_id` or `garage_id`).
    Parent(Id),
    Plate(String),
}

/// Parsed command from SQL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    InsertCity { input: NewCity, returning: bool },
    InsertHotel { input: NewHotel, returning: bool },
    InsertGarage { input: NewGarage, returning: bool },
    InsertCar { input: NewCar, returning: bool },
    UpdateCity { id: Id, changes: CityChanges, returning: bool },
    UpdateHotel { id: Id, changes: HotelChanges, returning: bool },
    UpdateGarage { id: Id, changes: GarageChanges, returning: bool },
    UpdateCar { id: Id, changes: CarChanges, returning: bool },
    Delete { kind: EntityKind, id: Id },
    Select {
        table: Table,
        filter: Filter,
        /// Indexes into `table.columns()`.
        projection: Vec<usize>,
    },
    SelectGarageSpaces { garage_id: Id, projection: Vec<usize> },
}

impl Command {
    /// The table a row-producing command reads from or writes to.
    pub fn table(&self) -> Table {
        match self {
            Command::InsertCity { .. } | Command::UpdateCity { .. } => Table::Cities,
            Command::InsertHotel { .. } | Command::UpdateHotel { .. } => Table::Hotels,
            Command::InsertGarage { .. } | Command::UpdateGarage { .. } => Table::Garages,
            Command::InsertCar { .. } | Command::UpdateCar { .. } => Table::Cars,
            Command::Delete { kind, .. } => match kind {
                EntityKind::City => Table::Cities,
                EntityKind::Hotel => Table::Hotels,
                EntityKind::Garage => Table::Garages,
                EntityKind::Car => Table::Cars,
            },
            Command::Select { table, .. } => *table,
            Command::SelectGarageSpaces { .. } => Table::GarageSpaces,
        }
    }

    /// Columns of the rows this command returns, or empty for a plain
    /// execution tag.
    pub fn result_columns(&self) -> Vec<Column> {
        match self {
            Command::InsertCity { returning, .. }
            | Command::InsertHotel { returning, .. }
            | Command::InsertGarage { returning, .. }
            | Command::InsertCar { returning, .. }
            | Command::UpdateCity { returning, .. }
            | Command::UpdateHotel { returning, .. }
            | Command::UpdateGarage { returning, .. }
            | Command::UpdateCar { returning, .. } => {
                if *returning {
                    self.table().columns().to_vec()
                } else {
                    vec![]
                }
            }
            Command::Delete { .. } => vec![],
            Command::Select { projection, .. } | Command::SelectGarageSpaces { projection, .. } => {
                let columns = self.table().columns();
                projection.iter().map(|&i| columns[i]).collect()
            }
        }
    }
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    if sql.len() > MAX_SQL_LEN {
        return Err(SqlError::TooLong(sql.len()));
    }
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let stmt = match stmts.as_slice() {
        [] => return Err(SqlError::Empty),
        [one] => one,
        _ => return Err(SqlError::Unsupported("multiple statements".into())),
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            returning,
            ..
        } => parse_update(table, assignments, selection, returning),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

// ── INSERT ────────────────────────────────────────────────────

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = entity_table(&insert_table_name(insert)?)?;
    let rows = extract_insert_rows(insert)?;
    if rows.len() != 1 {
        return Err(SqlError::Unsupported("multi-row INSERT".into()));
    }
    let values = &rows[0];

    let writable = table.writable();
    let names: Vec<String> = if insert.columns.is_empty() {
        if values.len() > writable.len() {
            return Err(SqlError::WrongArity(table.name(), writable.len(), values.len()));
        }
        writable[..values.len()].iter().map(|s| s.to_string()).collect()
    } else {
        insert.columns.iter().map(|i| i.value.to_lowercase()).collect()
    };
    if names.len() != values.len() {
        return Err(SqlError::WrongArity(table.name(), names.len(), values.len()));
    }

    let mut cols = Fields::new(table);
    for (name, value) in names.into_iter().zip(values) {
        cols.set(name, value)?;
    }
    let returning = insert.returning.is_some();

    let cmd = match table {
        Table::Cities => Command::InsertCity {
            input: NewCity {
                name: cols.required_text("name")?,
                population: cols.int("population")?.unwrap_or(0),
            },
            returning,
        },
        Table::Hotels => Command::InsertHotel {
            input: NewHotel {
                city_id: cols.required_int("city_id")?,
                name: cols.required_text("name")?,
                stars: cols.int("stars")?.unwrap_or(0),
            },
            returning,
        },
        Table::Garages => Command::InsertGarage {
            input: NewGarage {
                hotel_id: cols.required_int("hotel_id")?,
                name: cols.required_text("name")?,
                capacity: cols.required_int("capacity")?,
            },
            returning,
        },
        Table::Cars => Command::InsertCar {
            input: NewCar {
                garage_id: cols.required_int("garage_id")?,
                brand: cols.required_text("brand")?,
                license_plate: cols.required_text("license_plate")?,
                owner_name: cols.text("owner_name")?.unwrap_or_default(),
            },
            returning,
        },
        Table::GarageSpaces => return Err(SqlError::ReadOnly(table.name())),
    };
    Ok(cmd)
}

// ── UPDATE ────────────────────────────────────────────────────

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
    returning: &Option<Vec<SelectItem>>,
) -> Result<Command, SqlError> {
    let table = entity_table(&table_factor_name(&table.relation)?)?;
    let id = extract_where_id(selection)?;
    if assignments.is_empty() {
        return Err(SqlError::Parse("UPDATE without SET".into()));
    }

    let mut cols = Fields::new(table);
    for assignment in assignments {
        let name = match &assignment.target {
            AssignmentTarget::ColumnName(name) => {
                object_name_last(name).ok_or_else(|| SqlError::Parse("empty column name".into()))?
            }
            AssignmentTarget::Tuple(_) => {
                return Err(SqlError::Unsupported("tuple assignment".into()));
            }
        };
        cols.set(name, &assignment.value)?;
    }
    let returning = returning.is_some();

    let cmd = match table {
        Table::Cities => Command::UpdateCity {
            id,
            changes: CityChanges {
                name: cols.text("name")?,
                population: cols.int("population")?,
            },
            returning,
        },
        Table::Hotels => Command::UpdateHotel {
            id,
            changes: HotelChanges {
                city_id: cols.int("city_id")?,
                name: cols.text("name")?,
                stars: cols.int("stars")?,
            },
            returning,
        },
        Table::Garages => Command::UpdateGarage {
            id,
            changes: GarageChanges {
                hotel_id: cols.int("hotel_id")?,
                name: cols.text("name")?,
                capacity: cols.int("capacity")?,
            },
            returning,
        },
        Table::Cars => Command::UpdateCar {
            id,
            changes: CarChanges {
                garage_id: cols.int("garage_id")?,
                brand: cols.text("brand")?,
                license_plate: cols.text("license_plate")?,
                owner_name: cols.text("owner_name")?,
            },
            returning,
        },
        Table::GarageSpaces => return Err(SqlError::ReadOnly(table.name())),
    };
    Ok(cmd)
}

/// Column assignments of one INSERT row or UPDATE SET list.
struct Fields<'a> {
    table: Table,
    values: HashMap<String, &'a Expr>,
}

impl<'a> Fields<'a> {
    fn new(table: Table) -> Self {
        Self { table, values: HashMap::new() }
    }

    fn set(&mut self, name: String, value: &'a Expr) -> Result<(), SqlError> {
        if !self.table.writable().contains(&name.as_str()) {
            return if self.table.column_index(&name).is_some() {
                Err(SqlError::ReadOnlyColumn(name))
            } else {
                Err(SqlError::UnknownColumn(name))
            };
        }
        if self.values.insert(name.clone(), value).is_some() {
            return Err(SqlError::Parse(format!("column {name} given twice")));
        }
        Ok(())
    }

    fn int(&self, name: &'static str) -> Result<Option<i64>, SqlError> {
        self.values.get(name).map(|e| parse_i64_expr(e)).transpose()
    }

    fn text(&self, name: &'static str) -> Result<Option<String>, SqlError> {
        self.values.get(name).map(|e| parse_string_expr(e)).transpose()
    }

    fn required_int(&self, name: &'static str) -> Result<i64, SqlError> {
        self.int(name)?.ok_or(SqlError::MissingColumn(name))
    }

    fn required_text(&self, name: &'static str) -> Result<String, SqlError> {
        self.text(name)?.ok_or(SqlError::MissingColumn(name))
    }
}

// ── DELETE ────────────────────────────────────────────────────

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = entity_table(&delete_table_name(delete)?)?;
    let id = extract_where_id(&delete.selection)?;
    match table.kind() {
        Some(kind) => Ok(Command::Delete { kind, id }),
        None => Err(SqlError::ReadOnly(table.name())),
    }
}

// ── SELECT ────────────────────────────────────────────────────

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    if select.from.len() > 1 || !select.from[0].joins.is_empty() {
        return Err(SqlError::Unsupported("joins".into()));
    }
    let name = table_factor_name(&select.from[0].relation)?;
    let table = Table::from_name(&name).ok_or(SqlError::UnknownTable(name))?;
    let projection = parse_projection(table, &select.projection)?;

    if table == Table::GarageSpaces {
        let garage_id = match &select.selection {
            Some(expr) => match extract_eq(expr)? {
                (col, value) if col == "garage_id" => parse_i64_expr(value)?,
                _ => return Err(SqlError::MissingFilter("garage_id")),
            },
            None => return Err(SqlError::MissingFilter("garage_id")),
        };
        return Ok(Command::SelectGarageSpaces { garage_id, projection });
    }

    let filter = match &select.selection {
        None => Filter::All,
        Some(expr) => {
            let (col, value) = extract_eq(expr)?;
            if col == "id" {
                Filter::Id(parse_i64_expr(value)?)
            } else if Some(col.as_str()) == table.parent_column() {
                Filter::Parent(parse_i64_expr(value)?)
            } else if table == Table::Cars && col == "license_plate" {
                Filter::Plate(parse_string_expr(value)?)
            } else {
                return Err(SqlError::Unsupported(format!(
                    "filter on {col} for {}",
                    table.name()
                )));
            }
        }
    };
    Ok(Command::Select { table, filter, projection })
}

fn parse_projection(table: Table, items: &[SelectItem]) -> Result<Vec<usize>, SqlError> {
    let mut out = Vec::new();
    for item in items {
        match item {
            SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..) => {
                out.extend(0..table.columns().len());
            }
            SelectItem::UnnamedExpr(expr) => {
                let name = expr_column_name(expr)
                    .ok_or_else(|| SqlError::Unsupported("expressions in SELECT list".into()))?;
                let idx = table.column_index(&name).ok_or(SqlError::UnknownColumn(name))?;
                out.push(idx);
            }
            SelectItem::ExprWithAlias { .. } => {
                return Err(SqlError::Unsupported("column aliases".into()));
            }
        }
    }
    Ok(out)
}

// ── Helpers ───────────────────────────────────────────────────

fn entity_table(name: &str) -> Result<Table, SqlError> {
    let table = Table::from_name(name).ok_or_else(|| SqlError::UnknownTable(name.to_string()))?;
    if table.kind().is_none() {
        return Err(SqlError::ReadOnly(table.name()));
    }
    Ok(table)
}

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_rows(insert: &ast::Insert) -> Result<&[Vec<Expr>], SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(&values.rows)
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

/// `column = value`, the only predicate shape the front-end understands.
fn extract_eq(expr: &Expr) -> Result<(String, &Expr), SqlError> {
    match expr {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            let col = expr_column_name(left)
                .ok_or_else(|| SqlError::Unsupported(format!("predicate {expr}")))?;
            Ok((col, right.as_ref()))
        }
        Expr::Nested(inner) => extract_eq(inner),
        _ => Err(SqlError::Unsupported(format!("predicate {expr}"))),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Id, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match extract_eq(sel) {
        Ok((col, value)) if col == "id" => parse_i64_expr(value),
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

/// Integers arrive as bare numbers, or as quoted text from bound parameters.
fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad integer {s}: {e}"))),
            Value::SingleQuotedString(s) => s
                .trim()
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad integer '{s}': {e}"))),
            _ => Err(SqlError::Parse(format!("expected integer, got {value}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

fn parse_string_expr(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(other) => Err(SqlError::Parse(format!("expected string, got {other}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlError {
    Parse(String),
    Empty,
    TooLong(usize),
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    ReadOnly(&'static str),
    ReadOnlyColumn(String),
    WrongArity(&'static str, usize, usize),
    MissingColumn(&'static str),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::TooLong(n) => write!(f, "statement too long ({n} bytes)"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::ReadOnly(t) => write!(f, "{t} is read-only"),
            SqlError::ReadOnlyColumn(c) => write!(f, "column {c} cannot be written"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingColumn(c) => write!(f, "missing value for column {c}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_insert_city_with_columns() {
        let cmd = parse_sql("INSERT INTO cities (population, name) VALUES (10000, 'Pella')").unwrap();
        assert_eq!(
            cmd,
            Command::InsertCity {
                input: NewCity { name: "Pella".into(), population: 10000 },
                returning: false,
            }
        );
    }

    #[test]
    fn parse_insert_positional_with_defaults() {
        let cmd = parse_sql("INSERT INTO cities VALUES ('Pella')").unwrap();
        match cmd {
            Command::InsertCity { input, .. } => {
                assert_eq!(input.name, "Pella");
                assert_eq!(input.population, 0);
            }
            _ => panic!("expected InsertCity, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_car_returning() {
        let sql = "INSERT INTO cars (garage_id, brand, license_plate) VALUES (3, 'Fiat', 'PL001') RETURNING *";
        let cmd = parse_sql(sql).unwrap();
        assert_eq!(
            cmd,
            Command::InsertCar {
                input: NewCar {
                    garage_id: 3,
                    brand: "Fiat".into(),
                    license_plate: "PL001".into(),
                    owner_name: String::new(),
                },
                returning: true,
            }
        );
        assert_eq!(cmd.result_columns().len(), CAR_COLUMNS.len());
    }

    #[test]
    fn parse_insert_quoted_numbers_from_bound_params() {
        let cmd = parse_sql("INSERT INTO garages (hotel_id, name, capacity) VALUES ('1', 'G1', '25')").unwrap();
        match cmd {
            Command::InsertGarage { input, .. } => {
                assert_eq!(input.hotel_id, 1);
                assert_eq!(input.capacity, 25);
            }
            _ => panic!("expected InsertGarage, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_negative_number() {
        let cmd = parse_sql("INSERT INTO cities (name, population) VALUES ('X', -5)").unwrap();
        match cmd {
            Command::InsertCity { input, .. } => assert_eq!(input.population, -5),
            _ => panic!("expected InsertCity, got {cmd:?}"),
        }
    }

    #[test]
    fn insert_rejects_multi_row() {
        let err = parse_sql("INSERT INTO cities (name) VALUES ('A'), ('B')").unwrap_err();
        assert!(matches!(err, SqlError::Unsupported(_)));
    }

    #[test]
    fn insert_rejects_server_assigned_columns() {
        let err = parse_sql("INSERT INTO cities (id, name) VALUES (5, 'A')").unwrap_err();
        assert_eq!(err, SqlError::ReadOnlyColumn("id".into()));
        let err = parse_sql("INSERT INTO cars (garage_id, brand, license_plate, entry_time) VALUES (1, 'a', 'b', 0)")
            .unwrap_err();
        assert_eq!(err, SqlError::ReadOnlyColumn("entry_time".into()));
    }

    #[test]
    fn insert_missing_required_column() {
        let err = parse_sql("INSERT INTO garages (hotel_id, name) VALUES (1, 'G')").unwrap_err();
        assert_eq!(err, SqlError::MissingColumn("capacity"));
    }

    #[test]
    fn insert_unknown_column_and_table() {
        let err = parse_sql("INSERT INTO cities (name, mayor) VALUES ('A', 'B')").unwrap_err();
        assert_eq!(err, SqlError::UnknownColumn("mayor".into()));
        let err = parse_sql("INSERT INTO planes (name) VALUES ('A')").unwrap_err();
        assert_eq!(err, SqlError::UnknownTable("planes".into()));
    }

    #[test]
    fn insert_arity_mismatch() {
        let err = parse_sql("INSERT INTO cities (name, population) VALUES ('A')").unwrap_err();
        assert!(matches!(err, SqlError::WrongArity("cities", 2, 1)));
        let err = parse_sql("INSERT INTO cities VALUES ('A', 1, 2)").unwrap_err();
        assert!(matches!(err, SqlError::WrongArity("cities", 2, 3)));
    }

    #[test]
    fn insert_into_view_is_read_only() {
        let err = parse_sql("INSERT INTO garage_spaces VALUES (1)").unwrap_err();
        assert_eq!(err, SqlError::ReadOnly("garage_spaces"));
    }

    #[test]
    fn parse_update_patch() {
        let cmd = parse_sql("UPDATE cars SET garage_id = 4, owner_name = 'Eleni' WHERE id = 9").unwrap();
        assert_eq!(
            cmd,
            Command::UpdateCar {
                id: 9,
                changes: CarChanges {
                    garage_id: Some(4),
                    owner_name: Some("Eleni".into()),
                    ..Default::default()
                },
                returning: false,
            }
        );
    }

    #[test]
    fn parse_update_returning() {
        let cmd = parse_sql("UPDATE garages SET capacity = 2 WHERE id = 1 RETURNING *").unwrap();
        assert!(matches!(cmd, Command::UpdateGarage { returning: true, .. }));
        assert_eq!(cmd.result_columns()[0].name, "id");
    }

    #[test]
    fn update_requires_id_filter() {
        let err = parse_sql("UPDATE cities SET name = 'X'").unwrap_err();
        assert_eq!(err, SqlError::MissingFilter("id"));
        let err = parse_sql("UPDATE cities SET name = 'X' WHERE name = 'Y'").unwrap_err();
        assert_eq!(err, SqlError::MissingFilter("id"));
    }

    #[test]
    fn update_rejects_id_column() {
        let err = parse_sql("UPDATE cities SET id = 2 WHERE id = 1").unwrap_err();
        assert_eq!(err, SqlError::ReadOnlyColumn("id".into()));
    }

    #[test]
    fn parse_delete_each_table() {
        for (table, kind) in [
            ("cities", EntityKind::City),
            ("hotels", EntityKind::Hotel),
            ("garages", EntityKind::Garage),
            ("cars", EntityKind::Car),
        ] {
            let cmd = parse_sql(&format!("DELETE FROM {table} WHERE id = 7")).unwrap();
            assert_eq!(cmd, Command::Delete { kind, id: 7 });
            assert!(cmd.result_columns().is_empty());
        }
    }

    #[test]
    fn delete_without_filter_is_rejected() {
        let err = parse_sql("DELETE FROM cars").unwrap_err();
        assert_eq!(err, SqlError::MissingFilter("id"));
    }

    #[test]
    fn parse_select_all_and_by_id() {
        let cmd = parse_sql("SELECT * FROM hotels").unwrap();
        assert!(matches!(cmd, Command::Select { table: Table::Hotels, filter: Filter::All, .. }));
        let cmd = parse_sql("SELECT * FROM hotels WHERE id = 2").unwrap();
        assert!(matches!(cmd, Command::Select { filter: Filter::Id(2), .. }));
    }

    #[test]
    fn parse_select_by_parent_and_plate() {
        let cmd = parse_sql("SELECT * FROM cars WHERE garage_id = 3").unwrap();
        assert!(matches!(cmd, Command::Select { table: Table::Cars, filter: Filter::Parent(3), .. }));
        let cmd = parse_sql("SELECT * FROM garages WHERE hotel_id = 1").unwrap();
        assert!(matches!(cmd, Command::Select { filter: Filter::Parent(1), .. }));
        let cmd = parse_sql("SELECT * FROM cars WHERE license_plate = 'PL001'").unwrap();
        assert!(matches!(cmd, Command::Select { filter: Filter::Plate(ref p), .. } if p == "PL001"));
    }

    #[test]
    fn select_rejects_filter_on_other_columns() {
        let err = parse_sql("SELECT * FROM cities WHERE name = 'Pella'").unwrap_err();
        assert!(matches!(err, SqlError::Unsupported(_)));
        // Plate lookups only exist on cars.
        assert!(parse_sql("SELECT * FROM hotels WHERE license_plate = 'X'").is_err());
    }

    #[test]
    fn select_projection_picks_columns() {
        let cmd = parse_sql("SELECT name, id FROM cities").unwrap();
        let names: Vec<_> = cmd.result_columns().iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["name", "id"]);
        let err = parse_sql("SELECT mayor FROM cities").unwrap_err();
        assert_eq!(err, SqlError::UnknownColumn("mayor".into()));
    }

    #[test]
    fn parse_select_garage_spaces() {
        let cmd = parse_sql("SELECT * FROM garage_spaces WHERE garage_id = 5").unwrap();
        assert!(matches!(cmd, Command::SelectGarageSpaces { garage_id: 5, .. }));
        assert_eq!(cmd.result_columns().len(), 4);
        let err = parse_sql("SELECT * FROM garage_spaces").unwrap_err();
        assert_eq!(err, SqlError::MissingFilter("garage_id"));
    }

    #[test]
    fn parse_empty_and_garbage() {
        assert_eq!(parse_sql("").unwrap_err(), SqlError::Empty);
        assert!(matches!(parse_sql("NOT SQL AT ALL"), Err(SqlError::Parse(_))));
        assert!(matches!(
            parse_sql("SELECT * FROM cities; SELECT * FROM hotels"),
            Err(SqlError::Unsupported(_))
        ));
    }

    #[test]
    fn oversized_statement_is_rejected() {
        let sql = format!("SELECT * FROM cities WHERE id = {}", "1".repeat(MAX_SQL_LEN));
        assert!(matches!(parse_sql(&sql), Err(SqlError::TooLong(_))));
    }

    #[test]
    fn table_names_are_case_insensitive() {
        let cmd = parse_sql("SELECT * FROM CITIES WHERE ID = 1").unwrap();
        assert!(matches!(cmd, Command::Select { table: Table::Cities, filter: Filter::Id(1), .. }));
    }
}
