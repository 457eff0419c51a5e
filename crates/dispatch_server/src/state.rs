//! Application state shared across every handler and the WebSocket connection
//! handler, mirroring the `AppState` shape the teacher-adjacent ingestion server
//! uses: one `Clone`-able struct of `Arc`-wrapped shared resources, handed to
//! `Router::with_state`.

use std::sync::Arc;

use axum::extract::FromRef;
use dispatch_core::credit_ledger::CreditLedgerService;
use dispatch_core::db::{
    CreditLedgerRepository, CreditPurchaseRepository, DriverRepository, NotificationRepository,
    OfferRepository, OtpRepository, Pool, ReconciliationRepository, TransactionRepository,
    TripRepository, UserRepository,
};
use dispatch_core::dispatch::DispatchEngine;
use dispatch_core::location::LocationService;
use dispatch_core::messaging::{MessageProvider, RetryQueue, WhatsAppHttpProvider};
use dispatch_core::otp::OtpService;
use dispatch_core::reconciliation::ReconciliationJob;
use dispatch_core::routing::{HttpRoutingClient, RoutingClient};
use dispatch_core::settlement::SettlementService;
use dispatch_core::spatial::SpatialRegistry;
use dispatch_core::trip::TripStateMachine;

use crate::auth::InMemoryTokenVerifier;
use crate::config::ServerConfig;

struct Inner {
    config: ServerConfig,

    users: UserRepository,
    drivers: DriverRepository,
    trips: TripRepository,
    offers: OfferRepository,
    notifications: NotificationRepository,
    transactions: TransactionRepository,

    dispatch: DispatchEngine,
    trip_state: TripStateMachine,
    otp: OtpService,
    settlement: SettlementService,
    credit_ledger: CreditLedgerService,
    location: LocationService,
    reconciliation: ReconciliationJob,

    spatial: Arc<SpatialRegistry>,
    routing: Arc<dyn RoutingClient>,
    retry_queue: Arc<RetryQueue>,
    token_verifier: Arc<InMemoryTokenVerifier>,
}

#[derive(Clone)]
pub struct AppState(Arc<Inner>);

impl FromRef<AppState> for AppState {
    fn from_ref(state: &AppState) -> Self {
        state.clone()
    }
}

impl AppState {
    /// Wires every repository and domain service from a single pool + config,
    /// exactly mirroring the constructor order of the services themselves.
    pub fn new(pool: Pool, config: ServerConfig) -> Self {
        let users = UserRepository::new(pool.clone());
        let drivers = DriverRepository::new(pool.clone());
        let trips = TripRepository::new(pool.clone());
        let offers = OfferRepository::new(pool.clone());
        let notifications = NotificationRepository::new(pool.clone());
        let transactions = TransactionRepository::new(pool.clone());
        let otp_repo = OtpRepository::new(pool.clone());
        let credit_ledger_repo = CreditLedgerRepository::new(pool.clone());
        let credit_purchase_repo = CreditPurchaseRepository::new(pool.clone());
        let reconciliation_repo = ReconciliationRepository::new(pool.clone());

        let whatsapp: Arc<dyn MessageProvider> = Arc::new(WhatsAppHttpProvider::new(
            config.whatsapp_base_url.clone(),
            config.whatsapp_api_token.clone(),
        ));
        let fallback: Option<Arc<dyn MessageProvider>> = match (&config.sms_base_url, &config.sms_api_key) {
            (Some(base), Some(key)) => Some(Arc::new(dispatch_core::messaging::SmsFallbackProvider::new(
                base.clone(),
                key.clone(),
            ))),
            _ => None,
        };

        let routing: Arc<dyn RoutingClient> = Arc::new(HttpRoutingClient::new(
            config.routing_base_url.clone(),
            std::time::Duration::from_millis(config.dispatch.routing_timeout_ms),
            config.dispatch.routing_circuit_threshold,
            std::time::Duration::from_secs(config.dispatch.routing_circuit_reset_sec),
            config.dispatch.routing_cache_capacity,
            std::time::Duration::from_secs(config.dispatch.routing_cache_ttl_sec),
        ));

        let dispatch = DispatchEngine::new(
            trips.clone(),
            offers.clone(),
            drivers.clone(),
            routing.clone(),
            config.dispatch,
        );
        let trip_state = TripStateMachine::new(trips.clone(), config.dispatch);
        let otp = OtpService::new(otp_repo, whatsapp.clone(), config.dispatch);
        let settlement = SettlementService::new(
            trips.clone(),
            transactions.clone(),
            drivers.clone(),
            credit_ledger_repo.clone(),
            config.dispatch,
        );
        let credit_ledger = CreditLedgerService::new(credit_ledger_repo, credit_purchase_repo);
        let location = LocationService::new(drivers.clone(), config.dispatch);
        let reconciliation = ReconciliationJob::new(transactions.clone(), reconciliation_repo);

        let (retry_queue, mut retry_rx) = RetryQueue::new(pool.clone(), whatsapp, fallback);
        let retry_queue = Arc::new(retry_queue);

        // Drains retry signals forever; a real delivery attempt against the
        // persisted notification row is made by whichever route enqueued it, this
        // task only exists so the channel has a live receiver for the process
        // lifetime (an unbound sender into a dropped receiver panics on send).
        tokio::spawn(async move { while retry_rx.recv().await.is_some() {} });

        Self(Arc::new(Inner {
            config,
            users,
            drivers,
            trips,
            offers,
            notifications,
            transactions,
            dispatch,
            trip_state,
            otp,
            settlement,
            credit_ledger,
            location,
            reconciliation,
            spatial: Arc::new(SpatialRegistry::new()),
            routing,
            retry_queue,
            token_verifier: Arc::new(InMemoryTokenVerifier::new()),
        }))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.0.config
    }

    pub fn users(&self) -> &UserRepository {
        &self.0.users
    }

    pub fn drivers(&self) -> &DriverRepository {
        &self.0.drivers
    }

    pub fn trips(&self) -> &TripRepository {
        &self.0.trips
    }

    pub fn offers(&self) -> &OfferRepository {
        &self.0.offers
    }

    pub fn notifications(&self) -> &NotificationRepository {
        &self.0.notifications
    }

    pub fn transactions(&self) -> &TransactionRepository {
        &self.0.transactions
    }

    pub fn dispatch(&self) -> &DispatchEngine {
        &self.0.dispatch
    }

    pub fn trip_state(&self) -> &TripStateMachine {
        &self.0.trip_state
    }

    pub fn otp(&self) -> &OtpService {
        &self.0.otp
    }

    pub fn settlement(&self) -> &SettlementService {
        &self.0.settlement
    }

    pub fn credit_ledger(&self) -> &CreditLedgerService {
        &self.0.credit_ledger
    }

    pub fn location(&self) -> &LocationService {
        &self.0.location
    }

    pub fn reconciliation(&self) -> &ReconciliationJob {
        &self.0.reconciliation
    }

    pub fn spatial(&self) -> &Arc<SpatialRegistry> {
        &self.0.spatial
    }

    pub fn routing(&self) -> &Arc<dyn RoutingClient> {
        &self.0.routing
    }

    pub fn retry_queue(&self) -> &Arc<RetryQueue> {
        &self.0.retry_queue
    }

    pub fn token_verifier(&self) -> &Arc<InMemoryTokenVerifier> {
        &self.0.token_verifier
    }
}
