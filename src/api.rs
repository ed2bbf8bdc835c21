//! REST API for the load planning service.
//!
//! Wraps the in-process engine in two endpoints: a full optimization run and
//! the re-finalization of a single container after a manual move.
//! Uses Axum as the web framework and supports CORS.

use std::sync::OnceLock;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};

use crate::config::{ApiConfig, OptimizerConfig};
use crate::finalizer::{FinalizeOptions, finalize};
use crate::model::{
    AssignmentKind, ContainerInstance, ContainerTemplate, CountryOverrides, CountryTable,
    CurrentAssignment, LoadedContainer, OptimizationSettings, Product, ValidationError,
};
use crate::optimizer::{OptimizationResult, optimize};

#[derive(Clone)]
struct ApiState {
    optimizer_config: OptimizerConfig,
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>load-planner API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-standalone-preset.js"
            integrity="sha384-2YH8WDRaj7V2OqU/trsmzSagmk/E2SutiCsGkdgoQwC9pNUJV1u/141DHB6jgs8t"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                const ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                    presets: [SwaggerUIBundle.presets.apis, SwaggerUIStandalonePreset],
                    layout: "StandaloneLayout",
                });
                window.ui = ui;
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// Per-request overrides of the configured optimization settings.
#[derive(Deserialize, Clone, Copy, Debug, Default, ToSchema)]
pub struct SettingsOverride {
    #[serde(default)]
    #[schema(nullable = true)]
    pub max_utilization: Option<f64>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub allow_unit_splitting: Option<bool>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub shipping_date_grouping_range_days: Option<u32>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub respect_current_assignments: Option<bool>,
}

impl SettingsOverride {
    /// Applies every present field on top of `base`.
    pub fn apply(&self, base: OptimizationSettings) -> OptimizationSettings {
        OptimizationSettings::builder()
            .max_utilization(self.max_utilization.unwrap_or(base.max_utilization))
            .allow_unit_splitting(self.allow_unit_splitting.unwrap_or(base.allow_unit_splitting))
            .shipping_date_grouping_range_days(
                self.shipping_date_grouping_range_days
                    .or(base.shipping_date_grouping_range_days),
            )
            .respect_current_assignments(
                self.respect_current_assignments
                    .unwrap_or(base.respect_current_assignments),
            )
            .build()
    }
}

#[derive(Deserialize, ToSchema)]
#[schema(
    example = json!({
        "products": [
            {
                "id": "p-1",
                "name": "Solvent A",
                "form_factor_id": "IBC1000",
                "quantity": 24,
                "weight": 22800.0,
                "destination": "DE",
                "country": "DE"
            }
        ],
        "templates": [
            {
                "id": "t-40",
                "name": "40ft Standard",
                "capacities": { "IBC1000": 20 },
                "cost": 2400.0,
                "destination": "DE",
                "max_weight": 26000.0
            },
            {
                "id": "t-20",
                "name": "20ft Standard",
                "capacities": { "IBC1000": 10 },
                "cost": 1500.0,
                "destination": "DE"
            }
        ],
        "settings": { "max_utilization": 95.0 }
    })
)]
pub struct OptimizeRequest {
    pub products: Vec<Product>,
    pub templates: Vec<ContainerTemplate>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub settings: Option<SettingsOverride>,
    /// `country -> template id -> cost`
    #[serde(default)]
    #[schema(value_type = Object)]
    pub country_costs: CountryTable,
    /// `country -> template id -> weight limit`
    #[serde(default)]
    #[schema(value_type = Object)]
    pub country_weight_limits: CountryTable,
}

/// Response of an optimization run.
#[derive(Serialize, ToSchema)]
pub struct OptimizeResponse {
    pub assignments: Vec<LoadedContainer>,
    pub unassigned: Vec<Product>,
    pub is_complete: bool,
}

impl OptimizeResponse {
    pub fn from_result(result: OptimizationResult) -> Self {
        let is_complete = result.is_complete();
        Self {
            assignments: result.assignments,
            unassigned: result.unassigned,
            is_complete,
        }
    }
}

/// Container contents after a manual move, to be validated again.
#[derive(Deserialize, ToSchema)]
pub struct FinalizeRequest {
    pub container: ContainerInstance,
    pub assigned_products: Vec<Product>,
    #[serde(default)]
    pub options: FinalizeOptions,
}

impl FinalizeRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        self.container.template.validate()?;
        self.assigned_products
            .iter()
            .try_for_each(Product::validate)
    }
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn validation_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid input data",
        details,
    )
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_optimize, handle_finalize),
    components(
        schemas(
            OptimizeRequest,
            OptimizeResponse,
            SettingsOverride,
            FinalizeRequest,
            FinalizeOptions,
            ErrorResponse,
            Product,
            ContainerTemplate,
            ContainerInstance,
            LoadedContainer,
            CurrentAssignment,
            AssignmentKind,
            CountryOverrides
        )
    ),
    tags((name = "planning", description = "Endpoints for container load planning"))
)]
struct ApiDoc;

fn router(optimizer_config: OptimizerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/optimize", post(handle_optimize))
        .route("/finalize", post(handle_finalize))
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(ApiState { optimizer_config })
}

/// Starts the API server and serves until it terminates.
///
/// Configures CORS for cross-origin requests from planning frontends.
pub async fn start_api_server(
    config: ApiConfig,
    optimizer_config: OptimizerConfig,
) -> std::io::Result<()> {
    let app = router(optimizer_config);
    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(
        "Server running on http://{}:{}",
        config.display_host(),
        config.port()
    );
    if config.binds_to_all_interfaces() {
        info!("Local access: http://localhost:{}", config.port());
    }
    info!("API endpoints: POST /optimize, POST /finalize");
    info!("Documentation: GET /docs, GET /docs/openapi.json");

    axum::serve(listener, app).await
}

/// Handler for POST /optimize.
///
/// Plans the submitted products into container instances. The engine runs on
/// a blocking worker so large requests do not stall the async runtime.
#[utoipa::path(
    post,
    path = "/optimize",
    request_body = OptimizeRequest,
    responses(
        (status = 200, description = "Load plan computed", body = OptimizeResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid products, templates or settings",
            body = ErrorResponse
        ),
        (status = INTERNAL_SERVER_ERROR, description = "Planning worker failed", body = ErrorResponse)
    ),
    tag = "planning"
)]
async fn handle_optimize(
    State(state): State<ApiState>,
    payload: Result<Json<OptimizeRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(err) => return json_deserialize_error(err),
    };

    let settings = request
        .settings
        .unwrap_or_default()
        .apply(state.optimizer_config.settings());
    let overrides = CountryOverrides::new(request.country_costs, request.country_weight_limits);
    info!(
        products = request.products.len(),
        templates = request.templates.len(),
        "new optimize request"
    );

    let products = request.products;
    let templates = request.templates;
    let joined = tokio::task::spawn_blocking(move || {
        optimize(products, &templates, &settings, &overrides)
    })
    .await;

    match joined {
        Ok(Ok(result)) => {
            info!(
                containers = result.container_count(),
                unassigned = result.unassigned_count(),
                "optimize request finished"
            );
            (StatusCode::OK, Json(OptimizeResponse::from_result(result))).into_response()
        }
        Ok(Err(err)) => validation_error(err.to_string()),
        Err(err) => {
            error!("planning worker failed: {err}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Planning failed",
                err.to_string(),
            )
        }
    }
}

/// Handler for POST /finalize.
///
/// Recomputes utilization, weight and validation issues of one container,
/// e.g. after products were moved by hand.
#[utoipa::path(
    post,
    path = "/finalize",
    request_body = FinalizeRequest,
    responses(
        (status = 200, description = "Container re-validated", body = LoadedContainer),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid container or products",
            body = ErrorResponse
        )
    ),
    tag = "planning"
)]
async fn handle_finalize(
    State(state): State<ApiState>,
    payload: Result<Json<FinalizeRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(err) => return json_deserialize_error(err),
    };
    if let Err(err) = request.validate() {
        return validation_error(err.to_string());
    }

    let mut options = request.options;
    if options.max_utilization.is_none() {
        options.max_utilization = Some(state.optimizer_config.settings().max_utilization);
    }
    let loaded = finalize(request.container, request.assigned_products, &options);
    (StatusCode::OK, Json(loaded)).into_response()
}

async fn serve_openapi_json(State(_state): State<ApiState>) -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui(State(_state): State<ApiState>) -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}
