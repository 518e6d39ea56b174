// Analytics facade
//
// Runs the six aggregation metrics into one `AnalyticsBundle` and slices the
// bundle for reports. Holds nothing but a borrowed connection and an optional
// report format, so every call recomputes from the store.

use rusqlite::Connection;
use serde::ser::Error as _;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::analytics::{self, AnalyticsResult, DEFAULT_LIMIT};
use crate::error::AnalyticsError;
use crate::reports::{ReportData, ReportFormat};

// ============================================================================
// BUNDLE RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeExpenses {
    pub employee: String,
    pub total_expenses: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseTypeExpenses {
    pub expense_type: String,
    pub total_expenses: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeTrips {
    pub employee: String,
    pub trip_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DestinationTrips {
    pub destination: Option<String>,
    pub trip_count: i64,
}

impl From<(String, f64)> for EmployeeExpenses {
    fn from((employee, total_expenses): (String, f64)) -> Self {
        EmployeeExpenses {
            employee,
            total_expenses,
        }
    }
}

impl From<(String, f64)> for ExpenseTypeExpenses {
    fn from((expense_type, total_expenses): (String, f64)) -> Self {
        ExpenseTypeExpenses {
            expense_type,
            total_expenses,
        }
    }
}

impl From<(String, i64)> for EmployeeTrips {
    fn from((employee, trip_count): (String, i64)) -> Self {
        EmployeeTrips {
            employee,
            trip_count,
        }
    }
}

impl From<(Option<String>, i64)> for DestinationTrips {
    fn from((destination, trip_count): (Option<String>, i64)) -> Self {
        DestinationTrips {
            destination,
            trip_count,
        }
    }
}

/// All six metrics, serialized in declaration order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsBundle {
    pub total_expenses: f64,
    pub expenses_by_employee: Vec<EmployeeExpenses>,
    pub expenses_by_expense_type: Vec<ExpenseTypeExpenses>,
    pub employees_with_most_trips: Vec<EmployeeTrips>,
    pub most_popular_destinations: Vec<DestinationTrips>,
    /// Two decimals, e.g. `"150.00"`
    pub average_expense_per_trip: String,
}

impl AnalyticsBundle {
    /// Bundle as an ordered JSON object, the input shape of every report
    pub fn to_report_data(&self) -> AnalyticsResult<ReportData> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(AnalyticsError::Serialization(serde_json::Error::custom(
                "analytics bundle did not serialize to an object",
            ))),
        }
    }
}

/// Format the average the way the bundle carries it
pub fn format_average(average: f64) -> String {
    format!("{:.2}", average)
}

// ============================================================================
// SELECTOR
// ============================================================================

/// Which part of the bundle a report contains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    TotalExpenses,
    ExpensesByEmployee,
    ExpensesByExpenseType,
    EmployeesWithMostTrips,
    MostPopularDestinations,
    AverageExpensePerTrip,
    All,
}

impl DataType {
    pub const METRICS: [DataType; 6] = [
        DataType::TotalExpenses,
        DataType::ExpensesByEmployee,
        DataType::ExpensesByExpenseType,
        DataType::EmployeesWithMostTrips,
        DataType::MostPopularDestinations,
        DataType::AverageExpensePerTrip,
    ];

    /// Selector token, equal to the bundle field name for single metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::TotalExpenses => "total_expenses",
            DataType::ExpensesByEmployee => "expenses_by_employee",
            DataType::ExpensesByExpenseType => "expenses_by_expense_type",
            DataType::EmployeesWithMostTrips => "employees_with_most_trips",
            DataType::MostPopularDestinations => "most_popular_destinations",
            DataType::AverageExpensePerTrip => "average_expense_per_trip",
            DataType::All => "all",
        }
    }

    /// Keep only the selected entry of the bundle data
    pub fn select(&self, mut data: ReportData) -> ReportData {
        if *self == DataType::All {
            return data;
        }

        let key = self.as_str();
        let mut selected = ReportData::new();
        if let Some(value) = data.remove(key) {
            selected.insert(key.to_string(), value);
        }
        selected
    }
}

impl FromStr for DataType {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == DataType::All.as_str() {
            return Ok(DataType::All);
        }
        DataType::METRICS
            .iter()
            .copied()
            .find(|metric| metric.as_str() == s)
            .ok_or_else(|| AnalyticsError::InvalidDataType(s.to_string()))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// FACADE
// ============================================================================

pub struct AnalyticsFacade<'a> {
    conn: &'a Connection,
    report_format: Option<ReportFormat>,
}

impl<'a> AnalyticsFacade<'a> {
    /// Facade for reading analytics only; `generate_report` will fail
    pub fn new(conn: &'a Connection) -> Self {
        AnalyticsFacade {
            conn,
            report_format: None,
        }
    }

    pub fn with_report(conn: &'a Connection, report_format: ReportFormat) -> Self {
        AnalyticsFacade {
            conn,
            report_format: Some(report_format),
        }
    }

    pub fn report_format(&self) -> Option<ReportFormat> {
        self.report_format
    }

    pub fn get_all_analytics_data(&self) -> AnalyticsResult<AnalyticsBundle> {
        let total_expenses = analytics::total_expenses(self.conn)?;

        let expenses_by_employee = analytics::expenses_by_employee(self.conn)?
            .into_iter()
            .map(EmployeeExpenses::from)
            .collect();

        let expenses_by_expense_type = analytics::expenses_by_expense_type(self.conn)?
            .into_iter()
            .map(ExpenseTypeExpenses::from)
            .collect();

        let employees_with_most_trips =
            analytics::employees_with_most_trips(self.conn, DEFAULT_LIMIT)?
                .into_iter()
                .map(EmployeeTrips::from)
                .collect();

        let most_popular_destinations =
            analytics::most_popular_destinations(self.conn, DEFAULT_LIMIT)?
                .into_iter()
                .map(DestinationTrips::from)
                .collect();

        let average_expense_per_trip =
            format_average(analytics::average_expense_per_trip(self.conn)?);

        tracing::debug!(total_expenses, "analytics bundle assembled");

        Ok(AnalyticsBundle {
            total_expenses,
            expenses_by_employee,
            expenses_by_expense_type,
            employees_with_most_trips,
            most_popular_destinations,
            average_expense_per_trip,
        })
    }

    /// Render the selected part of the bundle with the configured format
    pub fn generate_report(&self, data_type: &str) -> AnalyticsResult<String> {
        let report_format = self.report_format.ok_or(AnalyticsError::ReportFactoryNotSet)?;
        let data_type: DataType = data_type.parse()?;

        let data = data_type.select(self.get_all_analytics_data()?.to_report_data()?);

        tracing::debug!(format = %report_format, data_type = %data_type, "generating report");
        report_format.create_report().generate(&data)
    }
}

/// Report entry point for transports: validates the format before touching the store
pub fn generate_report(
    conn: &Connection,
    report_type: &str,
    data_type: &str,
) -> AnalyticsResult<String> {
    let report_format: ReportFormat = report_type.parse()?;
    AnalyticsFacade::with_report(conn, report_format).generate_report(data_type)
}
