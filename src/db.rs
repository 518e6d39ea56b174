use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

use crate::error::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// ENTITIES
// ============================================================================

/// Employee - owns business trips (deleting cascades to trips and their expenses)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,

    #[serde(rename = "fio")]
    pub full_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEmployee {
    #[serde(rename = "fio")]
    pub full_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmployeeUpdate {
    #[serde(rename = "fio", default)]
    pub full_name: Option<String>,
}

/// Business trip of one employee
///
/// `start_trip <= end_trip` is not checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessTrip {
    pub id: i64,
    pub employee_id: i64,
    pub destination: Option<String>,
    pub start_trip: NaiveDateTime,
    pub end_trip: NaiveDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBusinessTrip {
    pub employee_id: i64,
    #[serde(default)]
    pub destination: Option<String>,
    pub start_trip: NaiveDateTime,
    pub end_trip: NaiveDateTime,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BusinessTripUpdate {
    pub employee_id: Option<i64>,
    /// `None` keeps the destination, `Some(None)` clears it
    #[serde(deserialize_with = "present")]
    pub destination: Option<Option<String>>,
    pub start_trip: Option<NaiveDateTime>,
    pub end_trip: Option<NaiveDateTime>,
}

/// Marks a field as present even when its value is `null`
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Expense category, name is unique
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseType {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewExpenseType {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpenseTypeUpdate {
    #[serde(default)]
    pub name: Option<String>,
}

/// Single expense booked against a trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub business_trip_id: i64,
    pub expense_type_id: i64,
    pub amount: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewExpense {
    pub business_trip_id: i64,
    pub expense_type_id: i64,
    pub amount: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExpenseUpdate {
    pub business_trip_id: Option<i64>,
    pub expense_type_id: Option<i64>,
    pub amount: Option<f64>,
}

// ============================================================================
// NESTED READ VIEWS
// ============================================================================

/// Expense together with its type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseDetail {
    #[serde(flatten)]
    pub expense: Expense,
    pub expense_type: ExpenseType,
}

/// Trip together with its expenses
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusinessTripDetail {
    #[serde(flatten)]
    pub trip: BusinessTrip,
    pub expenses: Vec<ExpenseDetail>,
}

/// Employee together with trips and their expenses
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeDetail {
    #[serde(flatten)]
    pub employee: Employee,
    pub business_trips: Vec<BusinessTripDetail>,
}

// ============================================================================
// SCHEMA
// ============================================================================

/// The four entity tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Employees,
    BusinessTrips,
    ExpenseTypes,
    Expenses,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Employees,
        Table::BusinessTrips,
        Table::ExpenseTypes,
        Table::Expenses,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Employees => "employees",
            Table::BusinessTrips => "business_trips",
            Table::ExpenseTypes => "expense_types",
            Table::Expenses => "expenses",
        }
    }
}

/// Open (or create) the database file and make sure the schema exists
pub fn open_database(path: &Path) -> StoreResult<Connection> {
    let conn = Connection::open(path)?;
    setup_database(&conn)?;
    tracing::debug!(path = %path.display(), "database opened");
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> StoreResult<()> {
    // WAL for crash recovery; foreign keys are off by default in SQLite
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", true)?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS employees (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fio TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS business_trips (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            employee_id INTEGER NOT NULL REFERENCES employees(id) ON DELETE CASCADE,
            destination TEXT,
            start_trip TEXT NOT NULL,
            end_trip TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS expense_types (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL
        );

        CREATE TABLE IF NOT EXISTS expenses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            business_trip_id INTEGER NOT NULL REFERENCES business_trips(id) ON DELETE CASCADE,
            expense_type_id INTEGER NOT NULL REFERENCES expense_types(id) ON DELETE CASCADE,
            amount REAL NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_employees_fio ON employees(fio);
        CREATE INDEX IF NOT EXISTS idx_trips_employee ON business_trips(employee_id);
        CREATE INDEX IF NOT EXISTS idx_expenses_trip ON expenses(business_trip_id);
        CREATE INDEX IF NOT EXISTS idx_expenses_type ON expenses(expense_type_id);",
    )?;

    Ok(())
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn employee_from_row(row: &Row) -> rusqlite::Result<Employee> {
    Ok(Employee {
        id: row.get(0)?,
        full_name: row.get(1)?,
    })
}

fn trip_from_row(row: &Row) -> rusqlite::Result<BusinessTrip> {
    Ok(BusinessTrip {
        id: row.get(0)?,
        employee_id: row.get(1)?,
        destination: row.get(2)?,
        start_trip: row.get(3)?,
        end_trip: row.get(4)?,
    })
}

fn expense_type_from_row(row: &Row) -> rusqlite::Result<ExpenseType> {
    Ok(ExpenseType {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

/// Maps `expenses JOIN expense_types` rows (see `EXPENSE_DETAIL_SELECT`)
fn expense_detail_from_row(row: &Row) -> rusqlite::Result<ExpenseDetail> {
    Ok(ExpenseDetail {
        expense: Expense {
            id: row.get(0)?,
            business_trip_id: row.get(1)?,
            expense_type_id: row.get(2)?,
            amount: row.get(3)?,
        },
        expense_type: ExpenseType {
            id: row.get(2)?,
            name: row.get(4)?,
        },
    })
}

const TRIP_SELECT: &str =
    "SELECT id, employee_id, destination, start_trip, end_trip FROM business_trips";

const EXPENSE_DETAIL_SELECT: &str =
    "SELECT x.id, x.business_trip_id, x.expense_type_id, x.amount, t.name
     FROM expenses x
     JOIN expense_types t ON t.id = x.expense_type_id";

fn row_exists(conn: &Connection, table: Table, id: i64) -> StoreResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            &format!("SELECT 1 FROM {} WHERE id = ?1", table.as_str()),
            [id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn require_reference(
    conn: &Connection,
    table: Table,
    entity: &'static str,
    id: i64,
) -> StoreResult<()> {
    if row_exists(conn, table, id)? {
        Ok(())
    } else {
        Err(StoreError::InvalidReference { entity, id })
    }
}

// ============================================================================
// EMPLOYEES
// ============================================================================

pub fn create_employee(conn: &Connection, new: &NewEmployee) -> StoreResult<Employee> {
    conn.execute("INSERT INTO employees (fio) VALUES (?1)", [&new.full_name])?;
    let id = conn.last_insert_rowid();
    tracing::info!(employee_id = id, "employee created");

    Ok(Employee {
        id,
        full_name: new.full_name.clone(),
    })
}

fn find_employee(conn: &Connection, id: i64) -> StoreResult<Employee> {
    conn.query_row(
        "SELECT id, fio FROM employees WHERE id = ?1",
        [id],
        employee_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("Employee", id))
}

fn employee_detail(conn: &Connection, employee: Employee) -> StoreResult<EmployeeDetail> {
    let mut stmt = conn.prepare(&format!("{} WHERE employee_id = ?1 ORDER BY id", TRIP_SELECT))?;
    let trips = stmt
        .query_map([employee.id], trip_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let business_trips = trips
        .into_iter()
        .map(|trip| trip_detail(conn, trip))
        .collect::<StoreResult<Vec<_>>>()?;

    Ok(EmployeeDetail {
        employee,
        business_trips,
    })
}

pub fn list_employees(conn: &Connection) -> StoreResult<Vec<EmployeeDetail>> {
    let mut stmt = conn.prepare("SELECT id, fio FROM employees ORDER BY id")?;
    let employees = stmt
        .query_map([], employee_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    employees
        .into_iter()
        .map(|employee| employee_detail(conn, employee))
        .collect()
}

pub fn get_employee(conn: &Connection, id: i64) -> StoreResult<EmployeeDetail> {
    let employee = find_employee(conn, id)?;
    employee_detail(conn, employee)
}

pub fn update_employee(
    conn: &Connection,
    id: i64,
    update: &EmployeeUpdate,
) -> StoreResult<EmployeeDetail> {
    let mut employee = find_employee(conn, id)?;

    if let Some(full_name) = &update.full_name {
        employee.full_name = full_name.clone();
    }

    conn.execute(
        "UPDATE employees SET fio = ?1 WHERE id = ?2",
        params![employee.full_name, id],
    )?;
    tracing::info!(employee_id = id, "employee updated");

    employee_detail(conn, employee)
}

/// Delete an employee; trips and their expenses go with it
pub fn delete_employee(conn: &Connection, id: i64) -> StoreResult<()> {
    let deleted = conn.execute("DELETE FROM employees WHERE id = ?1", [id])?;
    if deleted == 0 {
        return Err(StoreError::not_found("Employee", id));
    }
    tracing::info!(employee_id = id, "employee deleted");
    Ok(())
}

// ============================================================================
// BUSINESS TRIPS
// ============================================================================

pub fn create_business_trip(conn: &Connection, new: &NewBusinessTrip) -> StoreResult<BusinessTrip> {
    require_reference(conn, Table::Employees, "Employee", new.employee_id)?;

    conn.execute(
        "INSERT INTO business_trips (employee_id, destination, start_trip, end_trip)
         VALUES (?1, ?2, ?3, ?4)",
        params![new.employee_id, new.destination, new.start_trip, new.end_trip],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(trip_id = id, employee_id = new.employee_id, "business trip created");

    Ok(BusinessTrip {
        id,
        employee_id: new.employee_id,
        destination: new.destination.clone(),
        start_trip: new.start_trip,
        end_trip: new.end_trip,
    })
}

fn find_business_trip(conn: &Connection, id: i64) -> StoreResult<BusinessTrip> {
    conn.query_row(&format!("{} WHERE id = ?1", TRIP_SELECT), [id], trip_from_row)
        .optional()?
        .ok_or_else(|| StoreError::not_found("Business Trip", id))
}

fn trip_detail(conn: &Connection, trip: BusinessTrip) -> StoreResult<BusinessTripDetail> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE x.business_trip_id = ?1 ORDER BY x.id",
        EXPENSE_DETAIL_SELECT
    ))?;
    let expenses = stmt
        .query_map([trip.id], expense_detail_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(BusinessTripDetail { trip, expenses })
}

pub fn list_business_trips(conn: &Connection) -> StoreResult<Vec<BusinessTripDetail>> {
    let mut stmt = conn.prepare(&format!("{} ORDER BY id", TRIP_SELECT))?;
    let trips = stmt
        .query_map([], trip_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    trips.into_iter().map(|trip| trip_detail(conn, trip)).collect()
}

pub fn get_business_trip(conn: &Connection, id: i64) -> StoreResult<BusinessTripDetail> {
    let trip = find_business_trip(conn, id)?;
    trip_detail(conn, trip)
}

pub fn update_business_trip(
    conn: &Connection,
    id: i64,
    update: &BusinessTripUpdate,
) -> StoreResult<BusinessTripDetail> {
    let mut trip = find_business_trip(conn, id)?;

    if let Some(employee_id) = update.employee_id {
        require_reference(conn, Table::Employees, "Employee", employee_id)?;
        trip.employee_id = employee_id;
    }
    if let Some(destination) = &update.destination {
        trip.destination = destination.clone();
    }
    if let Some(start_trip) = update.start_trip {
        trip.start_trip = start_trip;
    }
    if let Some(end_trip) = update.end_trip {
        trip.end_trip = end_trip;
    }

    conn.execute(
        "UPDATE business_trips
         SET employee_id = ?1, destination = ?2, start_trip = ?3, end_trip = ?4
         WHERE id = ?5",
        params![trip.employee_id, trip.destination, trip.start_trip, trip.end_trip, id],
    )?;
    tracing::info!(trip_id = id, "business trip updated");

    trip_detail(conn, trip)
}

/// Delete a trip together with its expenses
pub fn delete_business_trip(conn: &Connection, id: i64) -> StoreResult<()> {
    let deleted = conn.execute("DELETE FROM business_trips WHERE id = ?1", [id])?;
    if deleted == 0 {
        return Err(StoreError::not_found("Business Trip", id));
    }
    tracing::info!(trip_id = id, "business trip deleted");
    Ok(())
}

// ============================================================================
// EXPENSE TYPES
// ============================================================================

fn name_taken(conn: &Connection, name: &str, except_id: Option<i64>) -> StoreResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM expense_types WHERE name = ?1 AND id != ?2",
            params![name, except_id.unwrap_or(-1)],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn create_expense_type(conn: &Connection, new: &NewExpenseType) -> StoreResult<ExpenseType> {
    if name_taken(conn, &new.name, None)? {
        return Err(StoreError::DuplicateName(new.name.clone()));
    }

    conn.execute("INSERT INTO expense_types (name) VALUES (?1)", [&new.name])?;
    let id = conn.last_insert_rowid();
    tracing::info!(expense_type_id = id, name = %new.name, "expense type created");

    Ok(ExpenseType {
        id,
        name: new.name.clone(),
    })
}

pub fn list_expense_types(conn: &Connection) -> StoreResult<Vec<ExpenseType>> {
    let mut stmt = conn.prepare("SELECT id, name FROM expense_types ORDER BY id")?;
    let types = stmt
        .query_map([], expense_type_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(types)
}

pub fn get_expense_type(conn: &Connection, id: i64) -> StoreResult<ExpenseType> {
    conn.query_row(
        "SELECT id, name FROM expense_types WHERE id = ?1",
        [id],
        expense_type_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("Expense Type", id))
}

pub fn update_expense_type(
    conn: &Connection,
    id: i64,
    update: &ExpenseTypeUpdate,
) -> StoreResult<ExpenseType> {
    let mut expense_type = get_expense_type(conn, id)?;

    if let Some(name) = &update.name {
        if name_taken(conn, name, Some(id))? {
            return Err(StoreError::DuplicateName(name.clone()));
        }
        expense_type.name = name.clone();
    }

    conn.execute(
        "UPDATE expense_types SET name = ?1 WHERE id = ?2",
        params![expense_type.name, id],
    )?;
    tracing::info!(expense_type_id = id, "expense type updated");

    Ok(expense_type)
}

/// Delete an expense type with all expenses of that type; returns the deleted row
pub fn delete_expense_type(conn: &Connection, id: i64) -> StoreResult<ExpenseType> {
    let expense_type = get_expense_type(conn, id)?;
    conn.execute("DELETE FROM expense_types WHERE id = ?1", [id])?;
    tracing::info!(expense_type_id = id, "expense type deleted");
    Ok(expense_type)
}

// ============================================================================
// EXPENSES
// ============================================================================

pub fn create_expense(conn: &Connection, new: &NewExpense) -> StoreResult<ExpenseDetail> {
    require_reference(conn, Table::BusinessTrips, "Business Trip", new.business_trip_id)?;
    require_reference(conn, Table::ExpenseTypes, "Expense Type", new.expense_type_id)?;

    conn.execute(
        "INSERT INTO expenses (business_trip_id, expense_type_id, amount) VALUES (?1, ?2, ?3)",
        params![new.business_trip_id, new.expense_type_id, new.amount],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(expense_id = id, trip_id = new.business_trip_id, "expense created");

    get_expense(conn, id)
}

pub fn list_expenses(conn: &Connection) -> StoreResult<Vec<ExpenseDetail>> {
    let mut stmt = conn.prepare(&format!("{} ORDER BY x.id", EXPENSE_DETAIL_SELECT))?;
    let expenses = stmt
        .query_map([], expense_detail_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(expenses)
}

pub fn get_expense(conn: &Connection, id: i64) -> StoreResult<ExpenseDetail> {
    conn.query_row(
        &format!("{} WHERE x.id = ?1", EXPENSE_DETAIL_SELECT),
        [id],
        expense_detail_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("Expense", id))
}

pub fn update_expense(
    conn: &Connection,
    id: i64,
    update: &ExpenseUpdate,
) -> StoreResult<ExpenseDetail> {
    let mut expense = get_expense(conn, id)?.expense;

    if let Some(trip_id) = update.business_trip_id {
        require_reference(conn, Table::BusinessTrips, "Business Trip", trip_id)?;
        expense.business_trip_id = trip_id;
    }
    if let Some(type_id) = update.expense_type_id {
        require_reference(conn, Table::ExpenseTypes, "Expense Type", type_id)?;
        expense.expense_type_id = type_id;
    }
    if let Some(amount) = update.amount {
        expense.amount = amount;
    }

    conn.execute(
        "UPDATE expenses SET business_trip_id = ?1, expense_type_id = ?2, amount = ?3 WHERE id = ?4",
        params![expense.business_trip_id, expense.expense_type_id, expense.amount, id],
    )?;
    tracing::info!(expense_id = id, "expense updated");

    get_expense(conn, id)
}

pub fn delete_expense(conn: &Connection, id: i64) -> StoreResult<()> {
    let deleted = conn.execute("DELETE FROM expenses WHERE id = ?1", [id])?;
    if deleted == 0 {
        return Err(StoreError::not_found("Expense", id));
    }
    tracing::info!(expense_id = id, "expense deleted");
    Ok(())
}

pub fn count_rows(conn: &Connection, table: Table) -> StoreResult<i64> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", table.as_str()),
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn employee(conn: &Connection, name: &str) -> Employee {
        create_employee(conn, &NewEmployee { full_name: name.to_string() }).unwrap()
    }

    fn trip(conn: &Connection, employee_id: i64, destination: Option<&str>) -> BusinessTrip {
        create_business_trip(
            conn,
            &NewBusinessTrip {
                employee_id,
                destination: destination.map(str::to_string),
                start_trip: at(1),
                end_trip: at(5),
            },
        )
        .unwrap()
    }

    fn expense_type(conn: &Connection, name: &str) -> ExpenseType {
        create_expense_type(conn, &NewExpenseType { name: name.to_string() }).unwrap()
    }

    fn expense(conn: &Connection, trip_id: i64, type_id: i64, amount: f64) -> ExpenseDetail {
        create_expense(
            conn,
            &NewExpense {
                business_trip_id: trip_id,
                expense_type_id: type_id,
                amount,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_count_rows_per_table() {
        let conn = test_db();
        for table in Table::ALL {
            assert_eq!(count_rows(&conn, table).unwrap(), 0, "{}", table.as_str());
        }

        let emp = employee(&conn, "Ivanov I.I.");
        trip(&conn, emp.id, None);
        trip(&conn, emp.id, Some("Moscow"));

        assert_eq!(count_rows(&conn, Table::Employees).unwrap(), 1);
        assert_eq!(count_rows(&conn, Table::BusinessTrips).unwrap(), 2);
        assert_eq!(count_rows(&conn, Table::ExpenseTypes).unwrap(), 0);
    }

    #[test]
    fn test_employee_crud() {
        let conn = test_db();

        let created = employee(&conn, "Ivanov I.I.");
        let fetched = get_employee(&conn, created.id).unwrap();
        assert_eq!(fetched.employee, created);
        assert!(fetched.business_trips.is_empty());

        let updated = update_employee(
            &conn,
            created.id,
            &EmployeeUpdate { full_name: Some("Petrov P.P.".to_string()) },
        )
        .unwrap();
        assert_eq!(updated.employee.full_name, "Petrov P.P.");

        // Empty update keeps the current value
        let unchanged = update_employee(&conn, created.id, &EmployeeUpdate::default()).unwrap();
        assert_eq!(unchanged.employee.full_name, "Petrov P.P.");

        delete_employee(&conn, created.id).unwrap();
        assert!(get_employee(&conn, created.id).unwrap_err().is_not_found());
        assert!(delete_employee(&conn, created.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_employee_detail_nests_trips_and_expenses() {
        let conn = test_db();
        let emp = employee(&conn, "Ivanov I.I.");
        let t = trip(&conn, emp.id, Some("Moscow"));
        let hotel = expense_type(&conn, "Hotel");
        expense(&conn, t.id, hotel.id, 120.0);

        let detail = get_employee(&conn, emp.id).unwrap();
        assert_eq!(detail.business_trips.len(), 1);
        assert_eq!(detail.business_trips[0].trip, t);
        assert_eq!(detail.business_trips[0].expenses.len(), 1);
        assert_eq!(detail.business_trips[0].expenses[0].expense_type, hotel);

        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["fio"], "Ivanov I.I.");
        assert_eq!(json["business_trips"][0]["destination"], "Moscow");
        assert_eq!(json["business_trips"][0]["start_trip"], "2024-03-01T09:00:00");
        assert_eq!(json["business_trips"][0]["expenses"][0]["expense_type"]["name"], "Hotel");
    }

    #[test]
    fn test_trip_requires_existing_employee() {
        let conn = test_db();

        let result = create_business_trip(
            &conn,
            &NewBusinessTrip {
                employee_id: 42,
                destination: None,
                start_trip: at(1),
                end_trip: at(2),
            },
        );

        assert!(matches!(
            result,
            Err(StoreError::InvalidReference { entity: "Employee", id: 42 })
        ));
    }

    #[test]
    fn test_trip_update_is_partial() {
        let conn = test_db();
        let emp = employee(&conn, "Ivanov I.I.");
        let t = trip(&conn, emp.id, Some("Moscow"));

        let updated = update_business_trip(
            &conn,
            t.id,
            &BusinessTripUpdate {
                destination: Some(Some("Kazan".to_string())),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(updated.trip.destination.as_deref(), Some("Kazan"));
        assert_eq!(updated.trip.start_trip, t.start_trip);
        assert_eq!(updated.trip.employee_id, emp.id);
    }

    #[test]
    fn test_trip_update_null_destination_clears_it() {
        let conn = test_db();
        let emp = employee(&conn, "Ivanov I.I.");
        let t = trip(&conn, emp.id, Some("Oslo"));

        // Absent field keeps the destination
        let keep: BusinessTripUpdate =
            serde_json::from_str(r#"{"end_trip": "2024-03-07T18:00:00"}"#).unwrap();
        assert_eq!(keep.destination, None);
        let kept = update_business_trip(&conn, t.id, &keep).unwrap();
        assert_eq!(kept.trip.destination.as_deref(), Some("Oslo"));
        assert_eq!(kept.trip.end_trip, at(7).date().and_hms_opt(18, 0, 0).unwrap());

        // Explicit null clears it
        let clear: BusinessTripUpdate = serde_json::from_str(r#"{"destination": null}"#).unwrap();
        assert_eq!(clear.destination, Some(None));
        let cleared = update_business_trip(&conn, t.id, &clear).unwrap();
        assert_eq!(cleared.trip.destination, None);
        assert_eq!(get_business_trip(&conn, t.id).unwrap().trip.destination, None);
    }

    #[test]
    fn test_expense_type_name_is_unique() {
        let conn = test_db();
        let hotel = expense_type(&conn, "Hotel");
        let food = expense_type(&conn, "Food");

        let duplicate = create_expense_type(&conn, &NewExpenseType { name: "Hotel".to_string() });
        assert!(matches!(duplicate, Err(StoreError::DuplicateName(_))));

        let rename = update_expense_type(
            &conn,
            food.id,
            &ExpenseTypeUpdate { name: Some("Hotel".to_string()) },
        );
        assert!(matches!(rename, Err(StoreError::DuplicateName(_))));

        // Renaming to its own name is fine
        let same = update_expense_type(
            &conn,
            hotel.id,
            &ExpenseTypeUpdate { name: Some("Hotel".to_string()) },
        )
        .unwrap();
        assert_eq!(same, hotel);
    }

    #[test]
    fn test_delete_expense_type_returns_row() {
        let conn = test_db();
        let hotel = expense_type(&conn, "Hotel");

        let deleted = delete_expense_type(&conn, hotel.id).unwrap();
        assert_eq!(deleted, hotel);
        assert!(list_expense_types(&conn).unwrap().is_empty());
        assert!(delete_expense_type(&conn, hotel.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_expense_crud() {
        let conn = test_db();
        let emp = employee(&conn, "Ivanov I.I.");
        let t = trip(&conn, emp.id, Some("Moscow"));
        let hotel = expense_type(&conn, "Hotel");
        let food = expense_type(&conn, "Food");

        let created = expense(&conn, t.id, hotel.id, 100.0);
        assert_eq!(created.expense_type, hotel);

        let updated = update_expense(
            &conn,
            created.expense.id,
            &ExpenseUpdate {
                expense_type_id: Some(food.id),
                amount: Some(80.5),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.expense.amount, 80.5);
        assert_eq!(updated.expense_type, food);

        let bad = update_expense(
            &conn,
            created.expense.id,
            &ExpenseUpdate { business_trip_id: Some(999), ..Default::default() },
        );
        assert!(matches!(bad, Err(StoreError::InvalidReference { .. })));

        delete_expense(&conn, created.expense.id).unwrap();
        assert!(list_expenses(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_delete_employee_cascades() {
        let conn = test_db();
        let emp = employee(&conn, "Ivanov I.I.");
        let other = employee(&conn, "Petrov P.P.");
        let hotel = expense_type(&conn, "Hotel");
        let t1 = trip(&conn, emp.id, Some("Moscow"));
        let t2 = trip(&conn, other.id, Some("Kazan"));
        expense(&conn, t1.id, hotel.id, 10.0);
        expense(&conn, t2.id, hotel.id, 20.0);

        delete_employee(&conn, emp.id).unwrap();

        assert_eq!(count_rows(&conn, Table::BusinessTrips).unwrap(), 1);
        assert_eq!(count_rows(&conn, Table::Expenses).unwrap(), 1);
        assert_eq!(list_expenses(&conn).unwrap()[0].expense.business_trip_id, t2.id);
    }

    #[test]
    fn test_delete_expense_type_cascades() {
        let conn = test_db();
        let emp = employee(&conn, "Ivanov I.I.");
        let t = trip(&conn, emp.id, None);
        let hotel = expense_type(&conn, "Hotel");
        let food = expense_type(&conn, "Food");
        expense(&conn, t.id, hotel.id, 10.0);
        expense(&conn, t.id, food.id, 20.0);

        delete_expense_type(&conn, hotel.id).unwrap();

        let remaining = list_expenses(&conn).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].expense_type, food);
        assert_eq!(count_rows(&conn, Table::BusinessTrips).unwrap(), 1);
    }
}
