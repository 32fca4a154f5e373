//! JSON API over the lot store
//!
//! Thin handlers: lock the connection, call the store, map errors to status
//! codes. The UI consuming these endpoints lives elsewhere.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

use crate::database::{self, LotFilter, PackagingFilter, PackagingGroup, QualityFilter};
use crate::error::LotError;
use crate::models::{Lot, NewLot, QualityControl, ShipmentStatus, TestResult};
use crate::sampling::{plan_samples, total_sample_size};

/// Shared application state (thread-safe database connection)
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
}

/// API response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn ok<T>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data: Some(data),
        error: None,
    })
}

/// Map a store error to a transport status, logging server-side failures
fn error_status(err: &LotError) -> StatusCode {
    match err {
        LotError::Database(_) => {
            log::error!("{}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
        LotError::LotNotFound(_) | LotError::RecordNotFound(_, _) => StatusCode::NOT_FOUND,
        LotError::DuplicateLotName(_) | LotError::NoCourierForAgency(_) => StatusCode::CONFLICT,
        LotError::InvalidQuantity(_)
        | LotError::InvalidTypeCount(_)
        | LotError::UnknownCardType(_)
        | LotError::UnknownCountry(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

// ── Lots ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct LotsQuery {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    subsidiary: Option<String>,
    lot_type: Option<String>,
}

async fn list_lots_handler(
    State(state): State<AppState>,
    Query(query): Query<LotsQuery>,
) -> Result<Json<ApiResponse<Vec<Lot>>>, StatusCode> {
    let lot_type = match query.lot_type.as_deref() {
        Some(s) => Some(
            crate::models::LotType::parse(s).ok_or(StatusCode::UNPROCESSABLE_ENTITY)?,
        ),
        None => None,
    };
    let filter = LotFilter {
        registered_from: query.from,
        registered_to: query.to,
        subsidiary: query.subsidiary,
        lot_type,
    };

    let conn = state.db.lock().unwrap();
    database::list_lots(&conn, &filter)
        .map(ok)
        .map_err(|e| error_status(&e))
}

async fn create_lot_handler(
    State(state): State<AppState>,
    Json(new_lot): Json<NewLot>,
) -> Result<Json<ApiResponse<Lot>>, StatusCode> {
    let conn = state.db.lock().unwrap();
    database::insert_lot(&conn, &new_lot)
        .map(ok)
        .map_err(|e| error_status(&e))
}

async fn get_lot_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Lot>>, StatusCode> {
    let conn = state.db.lock().unwrap();
    match database::get_lot(&conn, id) {
        Ok(Some(lot)) => Ok(ok(lot)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => Err(error_status(&e)),
    }
}

async fn update_lot_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(revised): Json<NewLot>,
) -> Result<Json<ApiResponse<Lot>>, StatusCode> {
    let conn = state.db.lock().unwrap();
    database::update_lot(&conn, id, &revised)
        .map(ok)
        .map_err(|e| error_status(&e))
}

async fn delete_lot_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, StatusCode> {
    let conn = state.db.lock().unwrap();
    database::delete_lot(&conn, id)
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(|e| error_status(&e))
}

// ── Quality control ────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct QualityEntry {
    card_type: String,
    quantity: u32,
}

#[derive(Deserialize)]
struct QualityRequest {
    lot_id: i64,
    entries: Vec<QualityEntry>,
    control_date: Option<NaiveDate>,
    #[serde(default)]
    remark: String,
    result: TestResult,
}

#[derive(Serialize)]
struct QualityPlanResponse {
    lines: Vec<QualityControl>,
    total_sample_size: u32,
}

async fn create_quality_handler(
    State(state): State<AppState>,
    Json(request): Json<QualityRequest>,
) -> Result<Json<ApiResponse<QualityPlanResponse>>, StatusCode> {
    let entries: Vec<(String, u32)> = request
        .entries
        .iter()
        .map(|e| (e.card_type.clone(), e.quantity))
        .collect();
    let plan = plan_samples(&entries).map_err(|e| error_status(&e))?;
    let total = total_sample_size(&plan);
    let control_date = request.control_date.unwrap_or_else(database::today_date);

    let mut conn = state.db.lock().unwrap();
    let lines = database::insert_quality_controls(
        &mut conn,
        request.lot_id,
        &plan,
        control_date,
        &request.remark,
        request.result,
    )
    .map_err(|e| error_status(&e))?;

    Ok(ok(QualityPlanResponse {
        lines,
        total_sample_size: total,
    }))
}

#[derive(Deserialize)]
struct QualityQuery {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    lot_id: Option<i64>,
    result: Option<String>,
}

async fn list_quality_handler(
    State(state): State<AppState>,
    Query(query): Query<QualityQuery>,
) -> Result<Json<ApiResponse<Vec<database::QualityRow>>>, StatusCode> {
    let result = match query.result.as_deref() {
        Some(s) => Some(TestResult::parse(s).ok_or(StatusCode::UNPROCESSABLE_ENTITY)?),
        None => None,
    };
    let filter = QualityFilter {
        from: query.from,
        to: query.to,
        lot_id: query.lot_id,
        result,
    };

    let conn = state.db.lock().unwrap();
    database::list_quality_controls(&conn, &filter)
        .map(ok)
        .map_err(|e| error_status(&e))
}

async fn quality_summary_handler(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<database::QualitySummary>>, StatusCode> {
    let conn = state.db.lock().unwrap();
    database::quality_summary(&conn)
        .map(ok)
        .map_err(|e| error_status(&e))
}

#[derive(Deserialize)]
struct QualityUpdate {
    quantity: u32,
    sample_size: u32,
    result: TestResult,
    #[serde(default)]
    remark: String,
}

async fn update_quality_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<QualityUpdate>,
) -> Result<Json<ApiResponse<()>>, StatusCode> {
    let conn = state.db.lock().unwrap();
    database::update_quality_control(
        &conn,
        id,
        update.quantity,
        update.sample_size,
        update.result,
        &update.remark,
    )
    .map(ok)
    .map_err(|e| error_status(&e))
}

async fn delete_quality_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, StatusCode> {
    let conn = state.db.lock().unwrap();
    database::delete_quality_control(&conn, id)
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(|e| error_status(&e))
}

// ── Packaging ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct PackagingRunRequest {
    registration_date: Option<NaiveDate>,
    subsidiary: String,
    #[serde(default = "default_operator")]
    operator: String,
    #[serde(default)]
    vip_gold: u32,
    #[serde(default)]
    vip_infinite: u32,
    #[serde(default)]
    remark: String,
}

fn default_operator() -> String {
    "Automatique".to_string()
}

async fn packaging_run_handler(
    State(state): State<AppState>,
    Json(request): Json<PackagingRunRequest>,
) -> Result<Json<ApiResponse<Vec<PackagingGroup>>>, StatusCode> {
    let date = request.registration_date.unwrap_or_else(database::today_date);

    let mut conn = state.db.lock().unwrap();
    database::run_packaging(
        &mut conn,
        date,
        &request.subsidiary,
        &request.operator,
        request.vip_gold,
        request.vip_infinite,
        &request.remark,
    )
    .map(ok)
    .map_err(|e| error_status(&e))
}

#[derive(Deserialize)]
struct SubsidiariesQuery {
    date: Option<NaiveDate>,
}

/// Subsidiaries with lots registered on a date - feeds the packaging form
async fn packaging_subsidiaries_handler(
    State(state): State<AppState>,
    Query(query): Query<SubsidiariesQuery>,
) -> Result<Json<ApiResponse<Vec<String>>>, StatusCode> {
    let date = query.date.unwrap_or_else(database::today_date);
    let conn = state.db.lock().unwrap();
    database::subsidiaries_registered_on(&conn, date)
        .map(ok)
        .map_err(|e| error_status(&e))
}

#[derive(Deserialize)]
struct PackagingQuery {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    subsidiary: Option<String>,
    lot_type: Option<String>,
}

async fn list_packaging_handler(
    State(state): State<AppState>,
    Query(query): Query<PackagingQuery>,
) -> Result<Json<ApiResponse<Vec<database::PackagingRowEntry>>>, StatusCode> {
    let lot_type = match query.lot_type.as_deref() {
        Some(s) => Some(
            crate::models::LotType::parse(s).ok_or(StatusCode::UNPROCESSABLE_ENTITY)?,
        ),
        None => None,
    };
    let filter = PackagingFilter {
        from: query.from,
        to: query.to,
        subsidiary: query.subsidiary,
        lot_type,
    };

    let conn = state.db.lock().unwrap();
    database::list_packaging(&conn, &filter)
        .map(ok)
        .map_err(|e| error_status(&e))
}

async fn packaging_summary_handler(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<database::PackagingSummary>>, StatusCode> {
    let conn = state.db.lock().unwrap();
    database::packaging_summary(&conn)
        .map(ok)
        .map_err(|e| error_status(&e))
}

async fn clear_packaging_handler(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<usize>>, StatusCode> {
    let conn = state.db.lock().unwrap();
    database::clear_packaging(&conn)
        .map(ok)
        .map_err(|e| error_status(&e))
}

// ── Delivery directory ─────────────────────────────────────────────────────

#[derive(Deserialize)]
struct AgencyRequest {
    country: String,
    agency: String,
}

async fn list_agencies_handler(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<crate::models::DeliveryAgency>>>, StatusCode> {
    let conn = state.db.lock().unwrap();
    database::list_agencies(&conn)
        .map(ok)
        .map_err(|e| error_status(&e))
}

async fn upsert_agency_handler(
    State(state): State<AppState>,
    Json(request): Json<AgencyRequest>,
) -> Result<Json<ApiResponse<()>>, StatusCode> {
    let conn = state.db.lock().unwrap();
    database::upsert_agency(&conn, &request.country, &request.agency)
        .map(ok)
        .map_err(|e| error_status(&e))
}

async fn delete_agency_handler(
    State(state): State<AppState>,
    Path(country): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let conn = state.db.lock().unwrap();
    database::delete_agency(&conn, &country)
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(|e| error_status(&e))
}

#[derive(Deserialize)]
struct CourierRequest {
    agency: String,
    last_name: String,
    first_name: String,
    #[serde(default)]
    contact: String,
}

#[derive(Deserialize)]
struct CouriersQuery {
    agency: Option<String>,
}

async fn list_couriers_handler(
    State(state): State<AppState>,
    Query(query): Query<CouriersQuery>,
) -> Result<Json<ApiResponse<Vec<crate::models::Courier>>>, StatusCode> {
    let conn = state.db.lock().unwrap();
    let result = match query.agency.as_deref() {
        Some(agency) => database::couriers_for_agency(&conn, agency),
        None => database::list_couriers(&conn),
    };
    result.map(ok).map_err(|e| error_status(&e))
}

async fn create_courier_handler(
    State(state): State<AppState>,
    Json(request): Json<CourierRequest>,
) -> Result<Json<ApiResponse<crate::models::Courier>>, StatusCode> {
    let conn = state.db.lock().unwrap();
    database::insert_courier(
        &conn,
        &request.agency,
        &request.last_name,
        &request.first_name,
        &request.contact,
    )
    .map(ok)
    .map_err(|e| error_status(&e))
}

async fn delete_courier_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, StatusCode> {
    let conn = state.db.lock().unwrap();
    database::delete_courier(&conn, id)
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(|e| error_status(&e))
}

async fn list_references_handler(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<crate::models::ShippingReference>>>, StatusCode> {
    let conn = state.db.lock().unwrap();
    database::list_references(&conn)
        .map(ok)
        .map_err(|e| error_status(&e))
}

async fn reference_handler(
    State(state): State<AppState>,
    Path(country): Path<String>,
) -> Result<Json<ApiResponse<String>>, StatusCode> {
    let conn = state.db.lock().unwrap();
    match database::shipping_reference_for(&conn, &country) {
        Ok(Some(reference)) => Ok(ok(reference)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => Err(error_status(&e)),
    }
}

// ── Shipments ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ShipmentRequest {
    lot_id: i64,
    country: String,
    #[serde(default = "default_shipment_status")]
    status: ShipmentStatus,
    #[serde(default)]
    waybill: String,
    courier_id: Option<i64>,
    shipment_date: Option<NaiveDate>,
}

fn default_shipment_status() -> ShipmentStatus {
    ShipmentStatus::Pending
}

async fn create_shipment_handler(
    State(state): State<AppState>,
    Json(request): Json<ShipmentRequest>,
) -> Result<Json<ApiResponse<crate::models::Shipment>>, StatusCode> {
    let shipment_date = request.shipment_date.unwrap_or_else(database::today_date);

    let conn = state.db.lock().unwrap();
    database::create_shipment(
        &conn,
        request.lot_id,
        &request.country,
        request.status,
        &request.waybill,
        request.courier_id,
        shipment_date,
    )
    .map(ok)
    .map_err(|e| error_status(&e))
}

async fn list_shipments_handler(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<database::ShipmentRow>>>, StatusCode> {
    let conn = state.db.lock().unwrap();
    database::list_shipments(&conn)
        .map(ok)
        .map_err(|e| error_status(&e))
}

#[derive(Deserialize)]
struct StatusUpdate {
    status: ShipmentStatus,
}

async fn shipment_status_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<ApiResponse<()>>, StatusCode> {
    let conn = state.db.lock().unwrap();
    database::update_shipment_status(&conn, id, update.status)
        .map(ok)
        .map_err(|e| error_status(&e))
}

async fn delete_shipment_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, StatusCode> {
    let conn = state.db.lock().unwrap();
    database::delete_shipment(&conn, id)
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(|e| error_status(&e))
}

#[derive(Serialize)]
struct ShipmentDashboard {
    by_status: database::ShipmentSummary,
    by_agency: Vec<(String, u32)>,
}

async fn shipment_summary_handler(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<ShipmentDashboard>>, StatusCode> {
    let conn = state.db.lock().unwrap();
    let by_status = database::shipment_status_counts(&conn).map_err(|e| error_status(&e))?;
    let by_agency = database::shipments_by_agency(&conn).map_err(|e| error_status(&e))?;
    Ok(ok(ShipmentDashboard {
        by_status,
        by_agency,
    }))
}

/// Build the API router
pub fn create_router(db: Arc<Mutex<Connection>>) -> Router {
    let state = AppState { db };

    Router::new()
        .route("/api/lots", get(list_lots_handler).post(create_lot_handler))
        .route(
            "/api/lots/{id}",
            get(get_lot_handler)
                .put(update_lot_handler)
                .delete(delete_lot_handler),
        )
        .route(
            "/api/quality",
            get(list_quality_handler).post(create_quality_handler),
        )
        .route("/api/quality/summary", get(quality_summary_handler))
        .route(
            "/api/quality/{id}",
            axum::routing::put(update_quality_handler).delete(delete_quality_handler),
        )
        .route("/api/packaging", get(list_packaging_handler).delete(clear_packaging_handler))
        .route("/api/packaging/run", post(packaging_run_handler))
        .route("/api/packaging/summary", get(packaging_summary_handler))
        .route(
            "/api/packaging/subsidiaries",
            get(packaging_subsidiaries_handler),
        )
        .route(
            "/api/agencies",
            get(list_agencies_handler).post(upsert_agency_handler),
        )
        .route(
            "/api/agencies/{country}",
            axum::routing::delete(delete_agency_handler),
        )
        .route(
            "/api/couriers",
            get(list_couriers_handler).post(create_courier_handler),
        )
        .route(
            "/api/couriers/{id}",
            axum::routing::delete(delete_courier_handler),
        )
        .route("/api/references", get(list_references_handler))
        .route("/api/references/{country}", get(reference_handler))
        .route(
            "/api/shipments",
            get(list_shipments_handler).post(create_shipment_handler),
        )
        .route("/api/shipments/summary", get(shipment_summary_handler))
        .route(
            "/api/shipments/{id}",
            axum::routing::delete(delete_shipment_handler),
        )
        .route("/api/shipments/{id}/status", patch(shipment_status_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the API server (async).
///
/// Binds to 0.0.0.0 (all interfaces) to work with Docker port mapping.
pub async fn serve(
    db: Arc<Mutex<Connection>>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(db);
    let addr = format!("0.0.0.0:{}", port);

    log::info!("API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{init_schema, seed_directory};
    use tempfile::TempDir;

    fn create_test_db() -> (Connection, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let conn = Connection::open(&db_path).unwrap();
        init_schema(&conn).unwrap();
        seed_directory(&conn).unwrap();
        (conn, temp_dir)
    }

    #[test]
    fn test_create_router() {
        let (conn, _temp_dir) = create_test_db();
        let db = Arc::new(Mutex::new(conn));

        let _router = create_router(db);
    }

    #[test]
    fn test_api_response_serialization() {
        let response: ApiResponse<Vec<i32>> = ApiResponse {
            success: true,
            data: Some(vec![1, 2, 3]),
            error: None,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("\"data\":[1,2,3]"));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            error_status(&LotError::InvalidQuantity(0)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            error_status(&LotError::LotNotFound(1)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_status(&LotError::DuplicateLotName("A".to_string())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_shipment_request_defaults() {
        let request: ShipmentRequest =
            serde_json::from_str(r#"{"lot_id": 1, "country": "Togo"}"#).unwrap();
        assert_eq!(request.status, ShipmentStatus::Pending);
        assert!(request.waybill.is_empty());
        assert!(request.courier_id.is_none());
    }

    #[test]
    fn test_packaging_request_defaults() {
        let request: PackagingRunRequest =
            serde_json::from_str(r#"{"subsidiary": "Mali"}"#).unwrap();
        assert_eq!(request.operator, "Automatique");
        assert_eq!(request.vip_gold, 0);
        assert_eq!(request.vip_infinite, 0);
    }
}
