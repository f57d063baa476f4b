//! HTTP service running the order saga.
//!
//! One process hosts the whole saga on an in-memory channel: the initiator
//! behind `POST /orders`, the orchestrator, the three participants and the
//! ending-notification consumer feeding the saga log behind `GET /events`.
//! Structured logging comes from `tracing`, metrics from Prometheus.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use messaging::{InMemoryChannel, InMemoryDeadLetters, Subscription};
use metrics_exporter_prometheus::PrometheusHandle;
use participants::{
    InMemoryCatalog, InMemoryInventory, InventoryParticipant, PaymentParticipant,
    ProductValidation,
};
use projections::{EndingProcessor, ReadModel, SagaLog};
use saga::{Initiator, Participants, SagaRuntime};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use error::StartupError;

/// Products the service knows about at startup.
pub const SEED_PRODUCTS: [&str; 4] = ["COMIC_BOOKS", "BOOKS", "MOVIES", "MUSIC"];

/// Units in stock for every seeded product.
pub const SEED_STOCK: u32 = 10;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub initiator: Initiator<InMemoryChannel>,
    pub saga_log: Arc<dyn SagaLog>,
    pub read_model: Arc<dyn ReadModel>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::place))
        .route("/events", get(routes::orders::find))
        .route("/events/all", get(routes::orders::all))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// The running saga behind the HTTP routes.
pub struct SagaService {
    state: Arc<AppState>,
    channel: InMemoryChannel,
    dead_letters: InMemoryDeadLetters,
    inventory: InMemoryInventory,
    runtime: SagaRuntime,
    processor: Subscription,
}

impl SagaService {
    /// Seeds the demo catalog and inventory, then subscribes every saga
    /// component and the ending processor to a fresh channel.
    pub async fn start<L>(config: &Config, saga_log: L) -> Result<Self, StartupError>
    where
        L: SagaLog + ReadModel + Clone + 'static,
    {
        let dead_letters = InMemoryDeadLetters::new();
        let channel =
            InMemoryChannel::with_config(config.channel_config(), Arc::new(dead_letters.clone()));
        let shared = Arc::new(channel.clone());

        let (validation, _) = ProductValidation::in_memory(InMemoryCatalog::new(SEED_PRODUCTS));
        let (payment, _, _) = PaymentParticipant::in_memory();
        let payment = payment.with_min_amount(config.payment_min_amount());
        let inventory = InMemoryInventory::new(SEED_PRODUCTS.map(|code| (code, SEED_STOCK)));
        let (inventory_participant, _) = InventoryParticipant::in_memory(inventory.clone());

        let runtime = SagaRuntime::start(
            Arc::clone(&shared),
            Arc::new(dead_letters.clone()),
            Participants {
                validation,
                payment,
                inventory: inventory_participant,
            },
        )
        .await?;

        let processor = EndingProcessor::new(Arc::new(saga_log.clone()))
            .subscribe(&channel)
            .await?;

        tracing::info!(
            read_model = saga_log.name(),
            products = SEED_PRODUCTS.len(),
            stock = SEED_STOCK,
            "saga service started"
        );

        let state = Arc::new(AppState {
            initiator: Initiator::new(shared),
            saga_log: Arc::new(saga_log.clone()),
            read_model: Arc::new(saga_log),
        });

        Ok(Self {
            state,
            channel,
            dead_letters,
            inventory,
            runtime,
            processor,
        })
    }

    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    pub fn channel(&self) -> &InMemoryChannel {
        &self.channel
    }

    pub fn dead_letters(&self) -> &InMemoryDeadLetters {
        &self.dead_letters
    }

    pub fn inventory(&self) -> &InMemoryInventory {
        &self.inventory
    }

    /// Stops every consumer.
    pub fn shutdown(self) {
        self.processor.unsubscribe();
        self.runtime.shutdown();
    }
}
