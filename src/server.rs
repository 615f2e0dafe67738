//! # Server Configuration
//!
//! Router assembly, shared state and the HTTP listener for the equipment
//! ledger API.

use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Request},
    http::{HeaderName, HeaderValue},
    middleware::{self, Next},
    response::Response,
    routing::{get, patch, post, put},
};
use sea_orm::DatabaseConnection;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::extraction::{ImageExtractor, vision::VisionExtractor};
use crate::handlers::{self, alerts, auth, balances, customers, driver_instructions, drivers};
use crate::handlers::{equipment_specifications, movements, vehicles};
use crate::ledger::AlertPolicy;
use crate::telemetry::{TRACE_ID_HEADER, TraceContext, trace_id_from_headers, with_trace_context};

/// Multipart framing allowance on top of the configured image size.
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub extractor: Arc<dyn ImageExtractor>,
}

impl AppState {
    pub fn new(db: DatabaseConnection, config: AppConfig, extractor: Arc<dyn ImageExtractor>) -> Self {
        Self {
            db,
            config: Arc::new(config),
            extractor,
        }
    }

    pub fn alert_policy(&self) -> AlertPolicy {
        AlertPolicy::from(&*self.config)
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let public = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me).put(auth::update_me))
        .route("/auth/change-password", post(auth::change_password))
        .route("/auth/users", get(auth::list_users))
        .route(
            "/auth/users/{id}",
            put(auth::update_user).delete(auth::deactivate_user),
        )
        .route("/auth/users/{id}/activate", post(auth::activate_user))
        .route(
            "/customers",
            get(customers::list_customers).post(customers::create_customer),
        )
        .route(
            "/customers/{id}",
            get(customers::get_customer)
                .put(customers::update_customer)
                .delete(customers::delete_customer),
        )
        .route("/customers/{id}/balance", get(customers::get_customer_balance))
        .route(
            "/customers/{id}/thresholds/{equipment_type}",
            put(customers::set_threshold),
        )
        .route(
            "/equipment-specifications",
            get(equipment_specifications::list_specifications)
                .post(equipment_specifications::create_specification),
        )
        .route(
            "/equipment-specifications/{id}",
            get(equipment_specifications::get_specification)
                .put(equipment_specifications::update_specification)
                .delete(equipment_specifications::delete_specification),
        )
        .route(
            "/movements",
            get(movements::list_movements).post(movements::create_movement),
        )
        .route("/movements/{id}/verify", post(movements::verify_movement))
        .route("/upload-photo", post(movements::upload_photo))
        .route("/balances", get(balances::list_balances))
        .route("/alerts", get(alerts::list_alerts))
        .route("/alerts/{id}/resolve", post(alerts::resolve_alert))
        .route(
            "/drivers",
            get(drivers::list_drivers).post(drivers::create_driver),
        )
        .route(
            "/drivers/{id}",
            get(drivers::get_driver)
                .put(drivers::update_driver)
                .delete(drivers::delete_driver),
        )
        .route(
            "/vehicles",
            get(vehicles::list_vehicles).post(vehicles::create_vehicle),
        )
        .route(
            "/vehicles/{id}",
            get(vehicles::get_vehicle)
                .put(vehicles::update_vehicle)
                .delete(vehicles::delete_vehicle),
        )
        .route(
            "/driver-instructions",
            get(driver_instructions::list_instructions)
                .post(driver_instructions::create_instruction),
        )
        .route(
            "/driver-instructions/auto-generated",
            get(driver_instructions::auto_generated_instructions),
        )
        .route(
            "/driver-instructions/{id}",
            get(driver_instructions::get_instruction)
                .put(driver_instructions::update_instruction)
                .delete(driver_instructions::delete_instruction),
        )
        .route(
            "/driver-instructions/{id}/status",
            patch(driver_instructions::update_instruction_status),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let body_limit = state.config.max_upload_bytes() + UPLOAD_OVERHEAD_BYTES;
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .merge(public)
        .merge(protected)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(middleware::from_fn(trace_id_middleware))
}

/// Scopes every request to a trace id and echoes it back on the response.
async fn trace_id_middleware(request: Request, next: Next) -> Response {
    let trace_id = trace_id_from_headers(request.headers());
    let span = tracing::info_span!(
        "request",
        trace_id = %trace_id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    let context = TraceContext {
        trace_id: trace_id.clone(),
    };

    let mut response = with_trace_context(context, next.run(request))
        .instrument(span)
        .await;
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(TRACE_ID_HEADER), value);
    }
    response
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin.trim()).ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Starts the server with the given configuration
pub async fn run_server(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<()> {
    let addr = config.bind_addr()?;
    let extractor = VisionExtractor::from_config(&config)?;
    if config.vision_api_key.is_none() {
        tracing::warn!("vision API key not set; photo uploads will record placeholder movements");
    }

    let profile = config.profile.clone();
    let app = create_app(AppState::new(db, config, Arc::new(extractor)));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "equipment ledger listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::logout,
        crate::handlers::auth::me,
        crate::handlers::auth::update_me,
        crate::handlers::auth::change_password,
        crate::handlers::auth::list_users,
        crate::handlers::auth::update_user,
        crate::handlers::auth::deactivate_user,
        crate::handlers::auth::activate_user,
        crate::handlers::customers::list_customers,
        crate::handlers::customers::get_customer,
        crate::handlers::customers::create_customer,
        crate::handlers::customers::update_customer,
        crate::handlers::customers::delete_customer,
        crate::handlers::customers::get_customer_balance,
        crate::handlers::customers::set_threshold,
        crate::handlers::equipment_specifications::list_specifications,
        crate::handlers::equipment_specifications::get_specification,
        crate::handlers::equipment_specifications::create_specification,
        crate::handlers::equipment_specifications::update_specification,
        crate::handlers::equipment_specifications::delete_specification,
        crate::handlers::movements::list_movements,
        crate::handlers::movements::create_movement,
        crate::handlers::movements::verify_movement,
        crate::handlers::movements::upload_photo,
        crate::handlers::balances::list_balances,
        crate::handlers::alerts::list_alerts,
        crate::handlers::alerts::resolve_alert,
        crate::handlers::drivers::list_drivers,
        crate::handlers::drivers::get_driver,
        crate::handlers::drivers::create_driver,
        crate::handlers::drivers::update_driver,
        crate::handlers::drivers::delete_driver,
        crate::handlers::vehicles::list_vehicles,
        crate::handlers::vehicles::get_vehicle,
        crate::handlers::vehicles::create_vehicle,
        crate::handlers::vehicles::update_vehicle,
        crate::handlers::vehicles::delete_vehicle,
        crate::handlers::driver_instructions::list_instructions,
        crate::handlers::driver_instructions::auto_generated_instructions,
        crate::handlers::driver_instructions::get_instruction,
        crate::handlers::driver_instructions::create_instruction,
        crate::handlers::driver_instructions::update_instruction,
        crate::handlers::driver_instructions::update_instruction_status,
        crate::handlers::driver_instructions::delete_instruction,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::HealthResponse,
            crate::error::ApiError,
            crate::models::alert::Model,
            crate::models::customer::Model,
            crate::models::customer_balance::Model,
            crate::models::movement::Model,
            crate::handlers::MessageResponse,
            crate::handlers::auth::UserResponse,
            crate::handlers::auth::RegisterRequest,
            crate::handlers::auth::LoginRequest,
            crate::handlers::auth::TokenResponse,
            crate::handlers::auth::ChangePasswordRequest,
            crate::handlers::movements::CreateMovementRequest,
            crate::handlers::movements::MovementRecordedResponse,
            crate::handlers::movements::UploadResponse,
            crate::handlers::movements::UploadForm,
            crate::handlers::driver_instructions::StatusUpdateRequest,
            crate::repositories::driver_instruction::AutoInstruction,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "root", description = "Service information and health"),
        (name = "auth", description = "Accounts, sessions and roles"),
        (name = "customers", description = "Customers and their per-type balances"),
        (name = "equipment", description = "Equipment specification catalogue"),
        (name = "movements", description = "Deliveries, collections and photo ingestion"),
        (name = "balances", description = "Reconciled balances"),
        (name = "alerts", description = "Over-threshold alerts"),
        (name = "fleet", description = "Drivers and vehicles"),
        (name = "instructions", description = "Driver instructions and collection tasks"),
    ),
    info(
        title = "Equipment Ledger API",
        description = "Reconciles reusable equipment held by customers and raises collection alerts",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
