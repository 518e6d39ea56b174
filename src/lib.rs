// Trip Expenses - Core Library
// Exposes the entity store, analytics and reports for the CLI, API server, and tests

pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod facade;
pub mod reports;

// Re-export commonly used types
pub use analytics::{
    average_expense_per_trip, employees_with_most_trips, expenses_by_employee,
    expenses_by_expense_type, most_popular_destinations, total_expenses, DEFAULT_LIMIT,
};
pub use crate::config::{AppConfig, DatabaseConfig, ServerConfig};
pub use db::{
    BusinessTrip, BusinessTripDetail, BusinessTripUpdate, Employee, EmployeeDetail,
    EmployeeUpdate, Expense, ExpenseDetail, ExpenseType, ExpenseTypeUpdate, ExpenseUpdate,
    NewBusinessTrip, NewEmployee, NewExpense, NewExpenseType, StoreResult, Table,
    open_database, setup_database, count_rows,
    create_employee, list_employees, get_employee, update_employee, delete_employee,
    create_business_trip, list_business_trips, get_business_trip, update_business_trip,
    delete_business_trip,
    create_expense_type, list_expense_types, get_expense_type, update_expense_type,
    delete_expense_type,
    create_expense, list_expenses, get_expense, update_expense, delete_expense,
};
pub use error::{AnalyticsError, ConfigError, StoreError};
pub use facade::{
    generate_report, AnalyticsBundle, AnalyticsFacade, DataType, DestinationTrips,
    EmployeeExpenses, EmployeeTrips, ExpenseTypeExpenses,
};
pub use reports::{JsonReport, Report, ReportData, ReportFormat, TextReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
