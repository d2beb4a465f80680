//! HTTP handler functions for the blotter API.

use actix_web::{HttpResponse, web};
use blotter_aggregate::{DEFAULT_PAGE_SIZE, IncidentOptions, ProximityOptions};
use blotter_geocoder::normalize_location;
use blotter_incident_models::Coordinate;
use blotter_server_models::{
    ApiHealth, ApiMeta, ApiResponse, GeocodeParams, IncidentQueryParams, OffenderQueryParams,
    ProximityQueryParams, RecordsQueryParams, SchemaParams, SearchQueryParams, SqlBody,
    TableQueryParams,
};
use blotter_spatial::RadiusFilter;
use blotter_sql::{Filter, OrderBy};

use crate::AppState;
use crate::error::GatewayError;

type HandlerResult = Result<HttpResponse, GatewayError>;

fn ok<T: serde::Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::new(data))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Parses an optional filter expression. Blank text means no filter.
fn parse_filter(text: Option<&str>) -> Result<Option<Filter>, GatewayError> {
    Ok(non_blank(text).map(Filter::parse).transpose()?)
}

fn parse_radius(radius: Option<(Coordinate, f64)>) -> Result<Option<RadiusFilter>, GatewayError> {
    radius
        .map(|(center, km)| {
            RadiusFilter::new(center, km).ok_or_else(|| {
                GatewayError::BadRequest(format!(
                    "Invalid radius: {km} km around ({}, {})",
                    center.latitude, center.longitude
                ))
            })
        })
        .transpose()
}

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ── Passthrough ─────────────────────────────────────────────────────

/// `GET /api/tables`
pub async fn tables(state: web::Data<AppState>) -> HandlerResult {
    Ok(ok(state.client.list_tables().await?))
}

/// `GET /api/schema?table=`
pub async fn schema(
    state: web::Data<AppState>,
    params: web::Query<SchemaParams>,
) -> HandlerResult {
    Ok(ok(state.client.schema(params.table.trim()).await?))
}

/// `GET /api/query`
///
/// Builds a guarded `SELECT TOP` from table, columns, filter and order.
pub async fn query_table(
    state: web::Data<AppState>,
    params: web::Query<TableQueryParams>,
) -> HandlerResult {
    let filter = parse_filter(params.filters.as_deref())?;
    let order_by = non_blank(params.order_by.as_deref())
        .map(OrderBy::parse_list)
        .transpose()?
        .unwrap_or_default();

    let rows = state
        .client
        .query(
            params.table.trim(),
            &params.column_list(),
            filter.as_ref(),
            &order_by,
            params.limit,
        )
        .await?;
    Ok(ok(rows))
}

/// `POST /api/query`
///
/// Runs a caller-supplied `SELECT`. Anything else is rejected before it is
/// sent.
pub async fn query_raw(state: web::Data<AppState>, body: web::Json<SqlBody>) -> HandlerResult {
    Ok(ok(state.client.raw(body.sql()).await?))
}

/// `GET /api/geocode?q=`
///
/// Returns `{lat, lon}` or `null` when the address is not found.
pub async fn geocode(
    state: web::Data<AppState>,
    params: web::Query<GeocodeParams>,
) -> HandlerResult {
    let query = non_blank(params.q.as_deref())
        .and_then(|q| normalize_location(q, &state.locality))
        .ok_or_else(|| GatewayError::BadRequest("q query required".to_string()))?;

    let found = state.geocoder.lookup(&query).await;
    Ok(ok(found.map(|c| {
        serde_json::json!({
            "lat": c.latitude,
            "lon": c.longitude,
        })
    })))
}

// ── Aggregation ─────────────────────────────────────────────────────

/// `GET /api/incidents`
///
/// Merged, coordinate-resolved feed across every feed source. Sources that
/// fail are listed in `meta.failedSources`.
pub async fn incidents(
    state: web::Data<AppState>,
    params: web::Query<IncidentQueryParams>,
) -> HandlerResult {
    let options = IncidentOptions {
        limits: params.source_limits(),
        default_limit: params.limit,
        date_from: params.date_from,
        date_to: params.date_to,
        filter: parse_filter(params.filters.as_deref())?,
        radius: parse_radius(params.radius())?,
    };

    let feed = state.orchestrator.get_incidents(&options).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::with_meta(
        feed.incidents,
        ApiMeta {
            failed_sources: feed.failed_sources,
            ..ApiMeta::default()
        },
    )))
}

/// `GET /api/proximity?address=&days=&nature=&distance=`
pub async fn proximity(
    state: web::Data<AppState>,
    params: web::Query<ProximityQueryParams>,
) -> HandlerResult {
    let address = non_blank(params.address.as_deref())
        .ok_or_else(|| GatewayError::BadRequest("address query required".to_string()))?;

    let mut options = ProximityOptions::new(address);
    if let Some(days) = params.days {
        options.days = days;
    }
    if let Some(distance) = params.distance {
        options.distance_ft = distance;
    }
    options.nature = non_blank(params.nature.as_deref()).map(str::to_string);

    Ok(ok(state.orchestrator.proximity(&options).await?))
}

/// `GET /api/records/{source}?page=&pageSize=`
pub async fn records(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<RecordsQueryParams>,
) -> HandlerResult {
    let page = state
        .orchestrator
        .list_records(
            &path,
            params.page.unwrap_or(1),
            params.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_meta(
        page.records,
        ApiMeta {
            has_more: Some(page.has_more),
            page: Some(page.page),
            page_size: Some(page.page_size),
            ..ApiMeta::default()
        },
    )))
}

// ── Correlation ─────────────────────────────────────────────────────

/// `GET /api/search360` and `GET /api/searchP2C`
///
/// One page of the merged person search.
pub async fn search(
    state: web::Data<AppState>,
    params: web::Query<SearchQueryParams>,
) -> HandlerResult {
    let radius = parse_radius(params.radius())?;
    let page = state
        .correlator
        .search(
            params.q.as_deref().unwrap_or_default(),
            params.page.unwrap_or(1),
            params.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            radius,
        )
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_meta(
        page.results,
        ApiMeta {
            has_more: Some(page.has_more),
            page: Some(page.page),
            page_size: Some(page.page_size),
            failed_sources: page.failed_sources,
        },
    )))
}

/// `GET /api/reoffenders?page=&pageSize=`
///
/// Recent arrestees with a corrections case under the same name.
pub async fn reoffenders(
    state: web::Data<AppState>,
    params: web::Query<RecordsQueryParams>,
) -> HandlerResult {
    let page = state
        .correlator
        .reoffenders(
            params.page.unwrap_or(1),
            params.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_meta(
        page.records,
        ApiMeta {
            has_more: Some(page.has_more),
            page: Some(page.page),
            page_size: Some(page.page_size),
            ..ApiMeta::default()
        },
    )))
}

/// `GET /api/offender?number=` or `GET /api/offender?first=&last=`
pub async fn offender(
    state: web::Data<AppState>,
    params: web::Query<OffenderQueryParams>,
) -> HandlerResult {
    let detail = if let Some(number) = non_blank(params.number.as_deref()) {
        state.correlator.offender_detail(number).await?
    } else {
        let first = non_blank(params.first.as_deref()).unwrap_or_default();
        let last = non_blank(params.last.as_deref()).unwrap_or_default();
        if first.is_empty() && last.is_empty() {
            return Err(GatewayError::BadRequest(
                "number or first/last query required".to_string(),
            ));
        }
        state.correlator.offender_detail_by_name(first, last).await?
    };

    detail
        .map(ok)
        .ok_or_else(|| GatewayError::NotFound("Offender not found".to_string()))
}
