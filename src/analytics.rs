// Aggregation engine - fixed set of read-only metrics over the entity store
//
// Every metric is one SQL aggregate. Empty tables give identity values
// (0.0 or an empty list), never an error. Grouping is by exact string match.
// Rankings break count ties by name ascending (NULL destination sorts first).

use rusqlite::{params, Connection};

use crate::error::AnalyticsError;

/// Rows returned by the ranked metrics when the caller passes no limit
pub const DEFAULT_LIMIT: i64 = 5;

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

/// Sum of every expense amount
pub fn total_expenses(conn: &Connection) -> AnalyticsResult<f64> {
    let total: f64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0.0) FROM expenses",
        [],
        |row| row.get(0),
    )?;
    Ok(total)
}

/// Total spent per employee full name (employees without expenses are absent)
pub fn expenses_by_employee(conn: &Connection) -> AnalyticsResult<Vec<(String, f64)>> {
    let mut stmt = conn.prepare(
        "SELECT e.fio, SUM(x.amount) AS total_expenses
         FROM employees e
         JOIN business_trips t ON t.employee_id = e.id
         JOIN expenses x ON x.business_trip_id = t.id
         GROUP BY e.fio
         ORDER BY e.fio",
    )?;

    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(groups = rows.len(), "expenses by employee");
    Ok(rows)
}

/// Total spent per expense type name (unused types are absent)
pub fn expenses_by_expense_type(conn: &Connection) -> AnalyticsResult<Vec<(String, f64)>> {
    let mut stmt = conn.prepare(
        "SELECT t.name, SUM(x.amount) AS total_expenses
         FROM expense_types t
         JOIN expenses x ON x.expense_type_id = t.id
         GROUP BY t.name
         ORDER BY t.name",
    )?;

    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(groups = rows.len(), "expenses by expense type");
    Ok(rows)
}

/// Employees ranked by number of trips, at most `limit` rows (negative: all rows)
pub fn employees_with_most_trips(
    conn: &Connection,
    limit: i64,
) -> AnalyticsResult<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT e.fio, COUNT(t.id) AS trip_count
         FROM employees e
         JOIN business_trips t ON t.employee_id = e.id
         GROUP BY e.fio
         ORDER BY trip_count DESC, e.fio ASC
         LIMIT ?1",
    )?;

    let rows = stmt
        .query_map(params![limit], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Destinations ranked by number of trips, at most `limit` rows (negative: all rows)
///
/// Trips without a destination form their own `None` group.
pub fn most_popular_destinations(
    conn: &Connection,
    limit: i64,
) -> AnalyticsResult<Vec<(Option<String>, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT destination, COUNT(*) AS trip_count
         FROM business_trips
         GROUP BY destination
         ORDER BY trip_count DESC, destination ASC
         LIMIT ?1",
    )?;

    let rows = stmt
        .query_map(params![limit], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Mean of per-trip expense sums, counting only trips that have expenses
///
/// Not the same as total / number of trips: trips with no expenses are skipped.
pub fn average_expense_per_trip(conn: &Connection) -> AnalyticsResult<f64> {
    let average: f64 = conn.query_row(
        "SELECT COALESCE(AVG(trip_total), 0.0)
         FROM (
            SELECT SUM(x.amount) AS trip_total
            FROM business_trips t
            JOIN expenses x ON x.business_trip_id = t.id
            GROUP BY t.id
         )",
        [],
        |row| row.get(0),
    )?;
    Ok(average)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        create_business_trip, create_employee, create_expense, create_expense_type,
        setup_database, NewBusinessTrip, NewEmployee, NewExpense, NewExpenseType,
    };
    use chrono::NaiveDate;

    struct Fixture {
        conn: Connection,
    }

    impl Fixture {
        fn new() -> Self {
            let conn = Connection::open_in_memory().unwrap();
            setup_database(&conn).unwrap();
            Fixture { conn }
        }

        fn employee(&self, name: &str) -> i64 {
            create_employee(&self.conn, &NewEmployee { full_name: name.to_string() })
                .unwrap()
                .id
        }

        fn trip(&self, employee_id: i64, destination: Option<&str>) -> i64 {
            let start = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
            let end = NaiveDate::from_ymd_opt(2024, 5, 3).unwrap().and_hms_opt(18, 0, 0).unwrap();
            create_business_trip(
                &self.conn,
                &NewBusinessTrip {
                    employee_id,
                    destination: destination.map(str::to_string),
                    start_trip: start,
                    end_trip: end,
                },
            )
            .unwrap()
            .id
        }

        fn expense_type(&self, name: &str) -> i64 {
            create_expense_type(&self.conn, &NewExpenseType { name: name.to_string() })
                .unwrap()
                .id
        }

        fn expense(&self, trip_id: i64, type_id: i64, amount: f64) {
            create_expense(
                &self.conn,
                &NewExpense {
                    business_trip_id: trip_id,
                    expense_type_id: type_id,
                    amount,
                },
            )
            .unwrap();
        }
    }

    /// Two employees, three trips (one without expenses), two expense types
    fn sample() -> Fixture {
        let f = Fixture::new();
        let ivanov = f.employee("Иванов И.И.");
        let petrov = f.employee("Петров П.П.");
        let hotel = f.expense_type("Проживание");
        let food = f.expense_type("Питание");

        let t1 = f.trip(ivanov, Some("Москва"));
        f.trip(ivanov, Some("Казань"));
        let t3 = f.trip(petrov, Some("Москва"));

        f.expense(t1, hotel, 200.0);
        f.expense(t1, food, 50.0);
        f.expense(t3, hotel, 100.0);
        f
    }

    #[test]
    fn test_empty_store_gives_identity_values() {
        let f = Fixture::new();

        assert_eq!(total_expenses(&f.conn).unwrap(), 0.0);
        assert!(expenses_by_employee(&f.conn).unwrap().is_empty());
        assert!(expenses_by_expense_type(&f.conn).unwrap().is_empty());
        assert!(employees_with_most_trips(&f.conn, DEFAULT_LIMIT).unwrap().is_empty());
        assert!(most_popular_destinations(&f.conn, DEFAULT_LIMIT).unwrap().is_empty());
        assert_eq!(average_expense_per_trip(&f.conn).unwrap(), 0.0);
    }

    #[test]
    fn test_total_expenses() {
        let f = sample();
        assert_eq!(total_expenses(&f.conn).unwrap(), 350.0);
    }

    #[test]
    fn test_expenses_by_employee() {
        let f = sample();
        let rows = expenses_by_employee(&f.conn).unwrap();

        assert_eq!(
            rows,
            vec![
                ("Иванов И.И.".to_string(), 250.0),
                ("Петров П.П.".to_string(), 100.0),
            ]
        );

        let sum: f64 = rows.iter().map(|(_, total)| total).sum();
        assert_eq!(sum, total_expenses(&f.conn).unwrap());
    }

    #[test]
    fn test_expenses_by_employee_groups_by_name() {
        let f = Fixture::new();
        let hotel = f.expense_type("Hotel");
        let a = f.employee("Smith");
        let b = f.employee("Smith");
        let c = f.employee("smith");
        let idle = f.employee("No Expenses");
        f.expense(f.trip(a, None), hotel, 10.0);
        f.expense(f.trip(b, None), hotel, 15.0);
        f.expense(f.trip(c, None), hotel, 1.0);
        f.trip(idle, None);

        let rows = expenses_by_employee(&f.conn).unwrap();
        assert_eq!(
            rows,
            vec![("Smith".to_string(), 25.0), ("smith".to_string(), 1.0)]
        );
    }

    #[test]
    fn test_expenses_by_expense_type() {
        let f = sample();
        f.expense_type("Unused");

        let rows = expenses_by_expense_type(&f.conn).unwrap();
        assert_eq!(
            rows,
            vec![
                ("Питание".to_string(), 50.0),
                ("Проживание".to_string(), 300.0),
            ]
        );
    }

    #[test]
    fn test_employees_with_most_trips() {
        let f = sample();
        f.employee("Never Travels");

        let rows = employees_with_most_trips(&f.conn, DEFAULT_LIMIT).unwrap();
        assert_eq!(
            rows,
            vec![
                ("Иванов И.И.".to_string(), 2),
                ("Петров П.П.".to_string(), 1),
            ]
        );

        let top = employees_with_most_trips(&f.conn, 1).unwrap();
        assert_eq!(top, vec![("Иванов И.И.".to_string(), 2)]);

        assert!(employees_with_most_trips(&f.conn, 0).unwrap().is_empty());

        // Negative limit means no limit
        assert_eq!(employees_with_most_trips(&f.conn, -1).unwrap(), rows);
        assert_eq!(most_popular_destinations(&f.conn, -1).unwrap().len(), 2);
    }

    #[test]
    fn test_employees_with_most_trips_breaks_ties_by_name() {
        let f = Fixture::new();
        for name in ["Carol", "Alice", "Bob"] {
            let id = f.employee(name);
            f.trip(id, None);
        }

        let rows = employees_with_most_trips(&f.conn, 2).unwrap();
        assert_eq!(rows, vec![("Alice".to_string(), 1), ("Bob".to_string(), 1)]);
    }

    #[test]
    fn test_most_popular_destinations() {
        let f = sample();

        let rows = most_popular_destinations(&f.conn, DEFAULT_LIMIT).unwrap();
        assert_eq!(
            rows,
            vec![
                (Some("Москва".to_string()), 2),
                (Some("Казань".to_string()), 1),
            ]
        );
    }

    #[test]
    fn test_missing_destination_is_its_own_group() {
        let f = Fixture::new();
        let id = f.employee("Alice");
        f.trip(id, None);
        f.trip(id, None);
        f.trip(id, Some("Paris"));
        f.trip(id, Some("paris"));
        f.trip(id, Some("Oslo"));

        let rows = most_popular_destinations(&f.conn, DEFAULT_LIMIT).unwrap();
        assert_eq!(
            rows,
            vec![
                (None, 2),
                (Some("Oslo".to_string()), 1),
                (Some("Paris".to_string()), 1),
                (Some("paris".to_string()), 1),
            ]
        );
    }

    #[test]
    fn test_average_expense_per_trip_single_trip() {
        let f = Fixture::new();
        let id = f.employee("Alice");
        let hotel = f.expense_type("Hotel");
        let trip = f.trip(id, Some("Oslo"));
        f.expense(trip, hotel, 100.0);
        f.expense(trip, hotel, 200.0);

        // One trip, so the average is that trip's total
        assert_eq!(average_expense_per_trip(&f.conn).unwrap(), 300.0);
    }

    #[test]
    fn test_average_expense_per_trip_is_mean_of_trip_totals() {
        let f = Fixture::new();
        let id = f.employee("Alice");
        let hotel = f.expense_type("Hotel");
        let oslo = f.trip(id, Some("Oslo"));
        let paris = f.trip(id, Some("Paris"));
        f.expense(oslo, hotel, 100.0);
        f.expense(oslo, hotel, 200.0);
        f.expense(paris, hotel, 100.0);

        // (300 + 100) / 2, not (100 + 200 + 100) / 3
        assert_eq!(average_expense_per_trip(&f.conn).unwrap(), 200.0);
    }

    #[test]
    fn test_average_expense_per_trip_skips_trips_without_expenses() {
        let f = sample();
        // (250 + 100) / 2, the expense-less trip to Kazan is not counted
        assert_eq!(average_expense_per_trip(&f.conn).unwrap(), 175.0);
    }
}
