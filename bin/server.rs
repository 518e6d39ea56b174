// Trip Expenses - Web Server
// REST API with Axum: CRUD for the four entities, analytics and report downloads

use anyhow::Context;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use trip_expenses::{
    analytics, db, facade::format_average, AnalyticsBundle, AnalyticsError, AnalyticsFacade,
    AppConfig, BusinessTrip, BusinessTripDetail, BusinessTripUpdate, DestinationTrips, Employee,
    EmployeeDetail, EmployeeExpenses, EmployeeTrips, EmployeeUpdate, ExpenseDetail, ExpenseType,
    ExpenseTypeExpenses, ExpenseTypeUpdate, ExpenseUpdate, NewBusinessTrip, NewEmployee,
    NewExpense, NewExpenseType, ReportFormat, ServerConfig, StoreError, DEFAULT_LIMIT,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
}

impl AppState {
    /// One request at a time owns the connection, so each sees a consistent snapshot
    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db.lock().map_err(|_| ApiError::LockPoisoned)
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Serialize)]
struct Message {
    message: &'static str,
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Analytics(#[from] AnalyticsError),

    #[error("{}", .0.body_text())]
    Body(#[from] JsonRejection),

    #[error("{}", .0.body_text())]
    Query(#[from] QueryRejection),

    #[error("Database connection is unavailable")]
    LockPoisoned,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::DuplicateName(_))
            | ApiError::Store(StoreError::InvalidReference { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Analytics(e) if e.is_invalid_input() => StatusCode::BAD_REQUEST,
            ApiError::Body(rejection) => rejection.status(),
            ApiError::Query(rejection) => rejection.status(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "request rejected");
        }

        (status, Json(ApiResponse::err(self.to_string()))).into_response()
    }
}

// ============================================================================
// API Handlers - Employees
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

async fn list_employees(State(state): State<AppState>) -> ApiResult<Vec<EmployeeDetail>> {
    let conn = state.conn()?;
    ok(db::list_employees(&conn)?)
}

async fn create_employee(
    State(state): State<AppState>,
    payload: Result<Json<NewEmployee>, JsonRejection>,
) -> ApiResult<Employee> {
    let Json(new) = payload?;
    let conn = state.conn()?;
    ok(db::create_employee(&conn, &new)?)
}

async fn get_employee(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<EmployeeDetail> {
    let conn = state.conn()?;
    ok(db::get_employee(&conn, id)?)
}

async fn update_employee(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<EmployeeUpdate>, JsonRejection>,
) -> ApiResult<EmployeeDetail> {
    let Json(update) = payload?;
    let conn = state.conn()?;
    ok(db::update_employee(&conn, id, &update)?)
}

async fn delete_employee(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Message> {
    let conn = state.conn()?;
    db::delete_employee(&conn, id)?;
    ok(Message {
        message: "Employee deleted",
    })
}

// ============================================================================
// API Handlers - Business trips
// ============================================================================

async fn list_business_trips(State(state): State<AppState>) -> ApiResult<Vec<BusinessTripDetail>> {
    let conn = state.conn()?;
    ok(db::list_business_trips(&conn)?)
}

async fn create_business_trip(
    State(state): State<AppState>,
    payload: Result<Json<NewBusinessTrip>, JsonRejection>,
) -> ApiResult<BusinessTrip> {
    let Json(new) = payload?;
    let conn = state.conn()?;
    ok(db::create_business_trip(&conn, &new)?)
}

async fn get_business_trip(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<BusinessTripDetail> {
    let conn = state.conn()?;
    ok(db::get_business_trip(&conn, id)?)
}

async fn update_business_trip(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<BusinessTripUpdate>, JsonRejection>,
) -> ApiResult<BusinessTripDetail> {
    let Json(update) = payload?;
    let conn = state.conn()?;
    ok(db::update_business_trip(&conn, id, &update)?)
}

async fn delete_business_trip(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Message> {
    let conn = state.conn()?;
    db::delete_business_trip(&conn, id)?;
    ok(Message {
        message: "Business Trip deleted",
    })
}

// ============================================================================
// API Handlers - Expense types
// ============================================================================

async fn list_expense_types(State(state): State<AppState>) -> ApiResult<Vec<ExpenseType>> {
    let conn = state.conn()?;
    ok(db::list_expense_types(&conn)?)
}

async fn create_expense_type(
    State(state): State<AppState>,
    payload: Result<Json<NewExpenseType>, JsonRejection>,
) -> ApiResult<ExpenseType> {
    let Json(new) = payload?;
    let conn = state.conn()?;
    ok(db::create_expense_type(&conn, &new)?)
}

async fn get_expense_type(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<ExpenseType> {
    let conn = state.conn()?;
    ok(db::get_expense_type(&conn, id)?)
}

async fn update_expense_type(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<ExpenseTypeUpdate>, JsonRejection>,
) -> ApiResult<ExpenseType> {
    let Json(update) = payload?;
    let conn = state.conn()?;
    ok(db::update_expense_type(&conn, id, &update)?)
}

/// DELETE /expense_types/:id - returns the deleted type
async fn delete_expense_type(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<ExpenseType> {
    let conn = state.conn()?;
    ok(db::delete_expense_type(&conn, id)?)
}

// ============================================================================
// API Handlers - Expenses
// ============================================================================

async fn list_expenses(State(state): State<AppState>) -> ApiResult<Vec<ExpenseDetail>> {
    let conn = state.conn()?;
    ok(db::list_expenses(&conn)?)
}

async fn create_expense(
    State(state): State<AppState>,
    payload: Result<Json<NewExpense>, JsonRejection>,
) -> ApiResult<ExpenseDetail> {
    let Json(new) = payload?;
    let conn = state.conn()?;
    ok(db::create_expense(&conn, &new)?)
}

async fn get_expense(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<ExpenseDetail> {
    let conn = state.conn()?;
    ok(db::get_expense(&conn, id)?)
}

async fn update_expense(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<ExpenseUpdate>, JsonRejection>,
) -> ApiResult<ExpenseDetail> {
    let Json(update) = payload?;
    let conn = state.conn()?;
    ok(db::update_expense(&conn, id, &update)?)
}

async fn delete_expense(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Message> {
    let conn = state.conn()?;
    db::delete_expense(&conn, id)?;
    ok(Message {
        message: "Expense deleted",
    })
}

// ============================================================================
// API Handlers - Analytics
// ============================================================================

#[derive(Deserialize)]
struct LimitQuery {
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

async fn total_expenses(State(state): State<AppState>) -> ApiResult<f64> {
    let conn = state.conn()?;
    ok(analytics::total_expenses(&conn)?)
}

async fn expenses_by_employee(State(state): State<AppState>) -> ApiResult<Vec<EmployeeExpenses>> {
    let conn = state.conn()?;
    let rows = analytics::expenses_by_employee(&conn)?;
    ok(rows.into_iter().map(EmployeeExpenses::from).collect())
}

async fn expenses_by_expense_type(
    State(state): State<AppState>,
) -> ApiResult<Vec<ExpenseTypeExpenses>> {
    let conn = state.conn()?;
    let rows = analytics::expenses_by_expense_type(&conn)?;
    ok(rows.into_iter().map(ExpenseTypeExpenses::from).collect())
}

async fn employees_with_most_trips(
    State(state): State<AppState>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> ApiResult<Vec<EmployeeTrips>> {
    let Query(query) = query?;
    let conn = state.conn()?;
    let rows = analytics::employees_with_most_trips(&conn, query.limit)?;
    ok(rows.into_iter().map(EmployeeTrips::from).collect())
}

async fn most_popular_destinations(
    State(state): State<AppState>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> ApiResult<Vec<DestinationTrips>> {
    let Query(query) = query?;
    let conn = state.conn()?;
    let rows = analytics::most_popular_destinations(&conn, query.limit)?;
    ok(rows.into_iter().map(DestinationTrips::from).collect())
}

async fn average_expense_per_trip(State(state): State<AppState>) -> ApiResult<String> {
    let conn = state.conn()?;
    ok(format_average(analytics::average_expense_per_trip(&conn)?))
}

async fn all_analytics(State(state): State<AppState>) -> ApiResult<AnalyticsBundle> {
    let conn = state.conn()?;
    ok(AnalyticsFacade::new(&conn).get_all_analytics_data()?)
}

/// GET /analytics/report/:report_type/:data_type - Download a report
async fn download_report(
    State(state): State<AppState>,
    Path((report_type, data_type)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    // Unknown formats are rejected before the connection is even taken
    let report_format: ReportFormat = report_type.parse()?;

    let conn = state.conn()?;
    let report = AnalyticsFacade::with_report(&conn, report_format).generate_report(&data_type)?;

    let headers = [
        (header::CONTENT_TYPE, report_format.media_type().to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment;filename={}", report_format.file_name()),
        ),
    ];
    Ok((headers, report).into_response())
}

// ============================================================================
// Main Server
// ============================================================================

fn router(state: AppState) -> Router {
    let api_routes = Router::new().route("/health", get(health_check));

    let analytics_routes = Router::new()
        .route("/total_expenses", get(total_expenses))
        .route("/expenses_by_employee", get(expenses_by_employee))
        .route("/expenses_by_expense_type", get(expenses_by_expense_type))
        .route("/employees_with_most_trips", get(employees_with_most_trips))
        .route("/most_popular_destinations", get(most_popular_destinations))
        .route("/average_expense_per_trip", get(average_expense_per_trip))
        .route("/all_analytics", get(all_analytics))
        .route("/report/:report_type/:data_type", get(download_report));

    Router::new()
        .route("/employees", get(list_employees).post(create_employee))
        .route(
            "/employees/:id",
            get(get_employee).put(update_employee).delete(delete_employee),
        )
        .route(
            "/business_trips",
            get(list_business_trips).post(create_business_trip),
        )
        .route(
            "/business_trips/:id",
            get(get_business_trip)
                .put(update_business_trip)
                .delete(delete_business_trip),
        )
        .route(
            "/expense_types",
            get(list_expense_types).post(create_expense_type),
        )
        .route(
            "/expense_types/:id",
            get(get_expense_type)
                .put(update_expense_type)
                .delete(delete_expense_type),
        )
        .route("/expenses", get(list_expenses).post(create_expense))
        .route(
            "/expenses/:id",
            get(get_expense).put(update_expense).delete(delete_expense),
        )
        .nest("/analytics", analytics_routes)
        .nest("/api", api_routes)
        .with_state(state)
}

fn cors_layer(server: &ServerConfig) -> anyhow::Result<CorsLayer> {
    let origin: HeaderValue = server
        .cors_origin
        .parse()
        .with_context(|| format!("Invalid CORS origin {:?}", server.cors_origin))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    config.validate()?;

    let conn = db::open_database(&config.database.path)
        .with_context(|| format!("Failed to open database {}", config.database.path.display()))?;
    tracing::info!(path = %config.database.path.display(), "database opened");

    // Create shared state
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
    };

    let app = router(state)
        .layer(cors_layer(&config.server)?)
        .layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("server running on http://{}", addr);
    tracing::info!("analytics: http://{}/analytics/all_analytics", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
