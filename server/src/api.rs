//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the ledger service's HTTP interface.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                          | Description                        |
//! |--------|-------------------------------|------------------------------------|
//! | GET    | `/health`                     | Liveness probe                     |
//! | GET    | `/status`                     | Service status summary             |
//! | GET    | `/packages`                   | Recharge catalog                   |
//! | POST   | `/users`                      | Create a user                      |
//! | GET    | `/users/:id`                  | Profile + wallet                   |
//! | GET    | `/users/:id/transactions`     | Recent history, newest first       |
//! | GET    | `/users/:id/loyalty`          | Loyalty tiering view               |
//! | GET    | `/users/:id/friends`          | Friend list                        |
//! | DELETE | `/users/:id/friends/:friend`  | Dissolve a friendship              |
//! | GET    | `/users/:id/requests`         | Pending friend-request inbox       |
//! | GET    | `/users/:id/requests/sent`    | Pending outgoing requests          |
//! | POST   | `/users/:id/requests`         | Send a friend request              |
//! | POST   | `/requests/:id/accept`        | Accept a request                   |
//! | POST   | `/requests/:id/reject`        | Reject a request                   |
//! | DELETE | `/requests/:id`               | Cancel a request (sender)          |
//! | POST   | `/users/:id/recharge`         | Purchase a coin package            |
//! | POST   | `/users/:id/exchange`         | Convert coins/diamonds             |
//! | POST   | `/users/:id/transfer`         | Transfer to a friend               |
//! | POST   | `/users/:id/gifts`            | Send a gift                        |
//! | POST   | `/users/:id/withdrawals`      | File a withdrawal request          |
//! | POST   | `/users/:id/orders`           | Record an order (loyalty input)    |
//! | POST   | `/broadcast`                  | Push broadcast to all tokens       |
//! | GET    | `/ws`                         | WebSocket for live ledger events   |
//!
//! The service trusts its callers the way the storefront trusted its client
//! SDK; authentication terminates upstream.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use souk_ledger::ledger::{
    ExchangeDirection, Ledger, LedgerError, PairedReceipt, Receipt,
};
use souk_ledger::loyalty::LoyaltyCard;
use souk_ledger::social::FriendRequest;
use souk_ledger::store::OrderStatus;
use souk_ledger::transaction::TransactionRecord;
use souk_ledger::wallet::{packages, Currency, Wallet};

use crate::metrics::SharedMetrics;
use crate::push::{self, PushGateway, PushMessage, PushReport};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone — everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The service's reported version string.
    pub version: String,
    /// The ledger facade over persistent storage.
    pub ledger: Arc<Ledger>,
    /// Broadcast channel for live ledger events.
    pub events: broadcast::Sender<LedgerEvent>,
    /// Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
    /// Push-gateway transport.
    pub push: Arc<dyn PushGateway>,
}

/// Events pushed to WebSocket subscribers.
///
/// The storefront's real-time listeners become this explicit channel: every
/// committed operation publishes the records it wrote and the wallets it
/// changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LedgerEvent {
    /// A transaction record was appended to someone's history.
    #[serde(rename = "transaction_recorded")]
    TransactionRecorded { record: TransactionRecord },
    /// A wallet's balances changed.
    #[serde(rename = "wallet_changed")]
    WalletChanged {
        user: String,
        coins: u64,
        diamonds: u64,
    },
    /// A friend request was created or resolved.
    #[serde(rename = "friend_request_updated")]
    FriendRequestUpdated { request: FriendRequest },
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
///
/// The returned router is ready to be served on the configured API port.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/packages", get(packages_handler))
        .route("/users", post(create_user_handler))
        .route("/users/:id", get(get_user_handler))
        .route("/users/:id/transactions", get(transactions_handler))
        .route("/users/:id/loyalty", get(loyalty_handler))
        .route("/users/:id/friends", get(friends_handler))
        .route("/users/:id/friends/:friend", delete(remove_friend_handler))
        .route(
            "/users/:id/requests",
            get(inbox_handler).post(send_request_handler),
        )
        .route("/users/:id/requests/sent", get(outgoing_handler))
        .route("/requests/:id/accept", post(accept_request_handler))
        .route("/requests/:id/reject", post(reject_request_handler))
        .route("/requests/:id", delete(cancel_request_handler))
        .route("/users/:id/recharge", post(recharge_handler))
        .route("/users/:id/exchange", post(exchange_handler))
        .route("/users/:id/transfer", post(transfer_handler))
        .route("/users/:id/gifts", post(gift_handler))
        .route("/users/:id/withdrawals", post(withdrawal_handler))
        .route("/users/:id/orders", post(record_order_handler))
        .route("/broadcast", post(broadcast_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request Types
// ---------------------------------------------------------------------------

/// Body for `POST /users`.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    /// Caller-chosen user id (the upstream auth subject).
    pub id: String,
    /// Display name shown to other users.
    pub display_name: String,
    /// Push token, when the device registered one.
    pub push_token: Option<String>,
}

/// Body for `POST /users/:id/recharge`.
#[derive(Debug, Deserialize)]
pub struct RechargeRequest {
    /// Catalog id of the package being purchased.
    pub package_id: u32,
}

/// Body for `POST /users/:id/exchange`.
#[derive(Debug, Deserialize)]
pub struct ExchangeRequest {
    pub direction: ExchangeDirection,
    pub amount: u64,
}

/// Body for `POST /users/:id/transfer`.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub recipient: String,
    pub currency: Currency,
    pub amount: u64,
}

/// Body for `POST /users/:id/gifts`.
#[derive(Debug, Deserialize)]
pub struct GiftRequest {
    pub recipient: String,
    /// Gift catalog id, e.g. `"crown"`.
    pub gift: String,
}

/// Body for `POST /users/:id/requests`.
#[derive(Debug, Deserialize)]
pub struct SendRequestBody {
    pub receiver: String,
}

/// Body identifying the acting user for accept/reject.
#[derive(Debug, Deserialize)]
pub struct CallerBody {
    pub user: String,
}

/// Query identifying the acting user for cancel.
#[derive(Debug, Deserialize)]
pub struct CallerQuery {
    pub user: String,
}

/// Body for `POST /users/:id/orders`.
#[derive(Debug, Deserialize)]
pub struct OrderRequest {
    pub status: OrderStatus,
    pub total_millimes: u64,
}

/// Body for `POST /broadcast`.
#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub title: String,
    pub body: String,
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Wallet balances as exposed over the API.
#[derive(Debug, Serialize, Deserialize)]
pub struct WalletView {
    pub coins: u64,
    pub diamonds: u64,
}

impl From<Wallet> for WalletView {
    fn from(wallet: Wallet) -> Self {
        Self {
            coins: wallet.coins,
            diamonds: wallet.diamonds,
        }
    }
}

/// Response payload for user reads and creation.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub display_name: String,
    pub wallet: WalletView,
    pub friends: Vec<String>,
    /// ISO-8601 creation timestamp.
    pub created_at: String,
}

impl From<souk_ledger::store::UserRecord> for UserResponse {
    fn from(user: souk_ledger::store::UserRecord) -> Self {
        Self {
            id: user.id,
            display_name: user.display_name,
            wallet: user.wallet.into(),
            friends: user.friends,
            created_at: format_ms(user.created_at_ms),
        }
    }
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub users: u64,
    pub transactions: u64,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// One entry of `GET /packages`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PackageView {
    pub id: u32,
    pub coins: u64,
    pub bonus: u64,
    pub price_millimes: u64,
    pub price_display: String,
}

/// Response payload for single-party wallet operations.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReceiptResponse {
    pub wallet: WalletView,
    pub record: TransactionRecord,
}

impl From<Receipt> for ReceiptResponse {
    fn from(receipt: Receipt) -> Self {
        Self {
            wallet: receipt.wallet.into(),
            record: receipt.record,
        }
    }
}

/// Response payload for transfers and gifts.
#[derive(Debug, Serialize, Deserialize)]
pub struct PairedReceiptResponse {
    pub sender_wallet: WalletView,
    pub recipient_wallet: WalletView,
    pub sent: TransactionRecord,
    pub received: TransactionRecord,
}

impl From<PairedReceipt> for PairedReceiptResponse {
    fn from(receipt: PairedReceipt) -> Self {
        Self {
            sender_wallet: receipt.sender_wallet.into(),
            recipient_wallet: receipt.recipient_wallet.into(),
            sent: receipt.sent,
            received: receipt.received,
        }
    }
}

/// Response payload for `GET /users/:id/loyalty`.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoyaltyResponse {
    pub delivered_orders: u64,
    pub completed_cards: u64,
    pub active_points: u64,
    pub cards: Vec<LoyaltyCard>,
}

/// One entry of `GET /users/:id/friends`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FriendSummary {
    pub id: String,
    pub display_name: String,
}

/// Response payload for `POST /broadcast`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BroadcastResponse {
    /// Users with a push token on file.
    pub recipients: usize,
    pub report: PushReport,
}

/// Generic error body returned by all endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Formats a unix-millisecond timestamp as RFC 3339.
fn format_ms(timestamp_ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms as i64)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Error Mapping
// ---------------------------------------------------------------------------

/// Maps a ledger error to its HTTP status.
///
/// Precondition failures (stale balances, missing friendships, resolved
/// requests) are conflicts: the request was well-formed but the ledger's
/// current state refuses it.
fn status_for(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::UnknownUser(_) | LedgerError::UnknownRequest(_) => StatusCode::NOT_FOUND,
        LedgerError::InvalidAmount
        | LedgerError::SelfTransfer
        | LedgerError::UnknownPackage(_)
        | LedgerError::UnknownGift(_)
        | LedgerError::RateOverflow => StatusCode::BAD_REQUEST,
        LedgerError::Balance(_)
        | LedgerError::NotFriends { .. }
        | LedgerError::WithdrawalBelowMinimum { .. }
        | LedgerError::RequestState(_)
        | LedgerError::NotYourRequest { .. }
        | LedgerError::AlreadyFriends(..)
        | LedgerError::RequestAlreadyPending(..)
        | LedgerError::UserExists(_) => StatusCode::CONFLICT,
        LedgerError::Db(_) | LedgerError::Codec(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Renders a ledger error as the standard JSON error body.
fn ledger_error(state: &AppState, err: LedgerError) -> Response {
    let status = status_for(&err);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("ledger operation failed: {}", err);
    } else {
        state.metrics.rejected_operations_total.inc();
    }
    (status, Json(ErrorResponse { error: err.to_string() })).into_response()
}

/// Publishes an event to WebSocket subscribers. Lagging or absent
/// subscribers are not an error.
fn publish(state: &AppState, event: LedgerEvent) {
    let _ = state.events.send(event);
}

fn publish_wallet(state: &AppState, user: &str, wallet: &Wallet) {
    publish(
        state,
        LedgerEvent::WalletChanged {
            user: user.to_string(),
            coins: wallet.coins,
            diamonds: wallet.diamonds,
        },
    );
}

/// Sends a single push notification to one user, if they have a token.
///
/// Best-effort: failures are logged and do not affect the triggering
/// operation's response.
async fn notify_user(state: &AppState, user_id: &str, title: &str, body: &str) {
    let token = match state.ledger.db().get_user(user_id) {
        Ok(Some(user)) => user.push_token,
        _ => None,
    };
    let Some(token) = token else { return };

    let message = PushMessage::new(token, title, body);
    match state.push.deliver(std::slice::from_ref(&message)).await {
        Ok(()) => {
            state.metrics.push_messages_sent_total.inc();
            state.metrics.push_batches_total.inc();
        }
        Err(e) => tracing::warn!(user = user_id, "push notification failed: {}", e),
    }
}

// ---------------------------------------------------------------------------
// Handlers — service
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the service is alive.
///
/// This is the liveness probe for orchestrators. It intentionally does not
/// check storage health — that belongs in `/status`.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — returns counts straight from the store.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let resp = StatusResponse {
        version: state.version.clone(),
        users: state.ledger.db().user_count() as u64,
        transactions: state.ledger.db().transaction_count() as u64,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    Json(resp)
}

/// `GET /packages` — the recharge catalog.
async fn packages_handler() -> impl IntoResponse {
    let catalog: Vec<PackageView> = packages::CATALOG
        .iter()
        .map(|p| PackageView {
            id: p.id,
            coins: p.coins,
            bonus: p.bonus,
            price_millimes: p.price_millimes,
            price_display: p.price_display(),
        })
        .collect();
    Json(catalog)
}

// ---------------------------------------------------------------------------
// Handlers — users
// ---------------------------------------------------------------------------

/// `POST /users` — creates a user record.
async fn create_user_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Response {
    match state
        .ledger
        .create_user(&req.id, &req.display_name, req.push_token)
    {
        Ok(user) => {
            state
                .metrics
                .user_count
                .set(state.ledger.db().user_count() as i64);
            (StatusCode::CREATED, Json(UserResponse::from(user))).into_response()
        }
        Err(e) => ledger_error(&state, e),
    }
}

/// `GET /users/:id` — profile and wallet.
async fn get_user_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    match state.ledger.get_user(&id) {
        Ok(user) => Json(UserResponse::from(user)).into_response(),
        Err(e) => ledger_error(&state, e),
    }
}

/// `GET /users/:id/transactions` — recent history, newest first.
async fn transactions_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    // Existence check first so unknown users 404 instead of listing empty.
    if let Err(e) = state.ledger.get_user(&id) {
        return ledger_error(&state, e);
    }
    match state
        .ledger
        .db()
        .recent_transactions(&id, souk_ledger::config::HISTORY_LIMIT)
    {
        Ok(records) => Json(records).into_response(),
        Err(e) => ledger_error(&state, LedgerError::Db(e)),
    }
}

/// `GET /users/:id/loyalty` — tiering summary plus the card wall.
async fn loyalty_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    match state.ledger.loyalty(&id) {
        Ok(view) => Json(LoyaltyResponse {
            delivered_orders: view.status.delivered_orders,
            completed_cards: view.status.completed_cards,
            active_points: view.status.active_points,
            cards: view.cards,
        })
        .into_response(),
        Err(e) => ledger_error(&state, e),
    }
}

/// `GET /users/:id/friends` — the friend list with display names.
async fn friends_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let user = match state.ledger.get_user(&id) {
        Ok(user) => user,
        Err(e) => return ledger_error(&state, e),
    };
    let mut friends = Vec::with_capacity(user.friends.len());
    for friend_id in &user.friends {
        if let Ok(Some(friend)) = state.ledger.db().get_user(friend_id) {
            friends.push(FriendSummary {
                id: friend.id,
                display_name: friend.display_name,
            });
        }
    }
    Json(friends).into_response()
}

/// `DELETE /users/:id/friends/:friend` — dissolves the friendship edge.
async fn remove_friend_handler(
    Path((id, friend)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Response {
    match state.ledger.remove_friend(&id, &friend) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => ledger_error(&state, e),
    }
}

// ---------------------------------------------------------------------------
// Handlers — friend requests
// ---------------------------------------------------------------------------

/// `GET /users/:id/requests` — the pending inbox.
async fn inbox_handler(Path(id): Path<String>, State(state): State<AppState>) -> Response {
    if let Err(e) = state.ledger.get_user(&id) {
        return ledger_error(&state, e);
    }
    match state.ledger.db().pending_requests_for(&id) {
        Ok(requests) => Json(requests).into_response(),
        Err(e) => ledger_error(&state, LedgerError::Db(e)),
    }
}

/// `GET /users/:id/requests/sent` — the caller's outstanding requests.
async fn outgoing_handler(Path(id): Path<String>, State(state): State<AppState>) -> Response {
    if let Err(e) = state.ledger.get_user(&id) {
        return ledger_error(&state, e);
    }
    match state.ledger.db().pending_requests_from(&id) {
        Ok(requests) => Json(requests).into_response(),
        Err(e) => ledger_error(&state, LedgerError::Db(e)),
    }
}

/// `POST /users/:id/requests` — sends a friend request and notifies the
/// receiver's device.
async fn send_request_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<SendRequestBody>,
) -> Response {
    match state.ledger.send_friend_request(&id, &req.receiver) {
        Ok(request) => {
            publish(
                &state,
                LedgerEvent::FriendRequestUpdated {
                    request: request.clone(),
                },
            );
            notify_user(
                &state,
                &req.receiver,
                "New invitation",
                &format!("{} sent you a friend request", request.sender_name),
            )
            .await;
            (StatusCode::CREATED, Json(request)).into_response()
        }
        Err(e) => ledger_error(&state, e),
    }
}

/// `POST /requests/:id/accept` — accepts a request on behalf of the
/// receiver named in the body, then notifies the original sender.
async fn accept_request_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(caller): Json<CallerBody>,
) -> Response {
    match state.ledger.accept_friend_request(&caller.user, &id) {
        Ok(request) => {
            publish(
                &state,
                LedgerEvent::FriendRequestUpdated {
                    request: request.clone(),
                },
            );
            notify_user(
                &state,
                &request.sender,
                "Invitation accepted",
                &format!("{} accepted your friend request", request.receiver_name),
            )
            .await;
            Json(request).into_response()
        }
        Err(e) => ledger_error(&state, e),
    }
}

/// `POST /requests/:id/reject` — rejects a request on behalf of the
/// receiver named in the body. The sender is not notified; the storefront
/// kept rejections silent.
async fn reject_request_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(caller): Json<CallerBody>,
) -> Response {
    match state.ledger.reject_friend_request(&caller.user, &id) {
        Ok(request) => {
            publish(
                &state,
                LedgerEvent::FriendRequestUpdated {
                    request: request.clone(),
                },
            );
            Json(request).into_response()
        }
        Err(e) => ledger_error(&state, e),
    }
}

/// `DELETE /requests/:id?user=<sender>` — the sender withdraws a pending
/// request.
async fn cancel_request_handler(
    Path(id): Path<String>,
    Query(caller): Query<CallerQuery>,
    State(state): State<AppState>,
) -> Response {
    match state.ledger.cancel_friend_request(&caller.user, &id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => ledger_error(&state, e),
    }
}

// ---------------------------------------------------------------------------
// Handlers — wallet operations
// ---------------------------------------------------------------------------

/// `POST /users/:id/recharge` — purchases a coin package.
async fn recharge_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<RechargeRequest>,
) -> Response {
    let _timer = state.metrics.op_latency_seconds.start_timer();
    match state.ledger.recharge(&id, req.package_id) {
        Ok(receipt) => {
            state.metrics.transactions_total.inc();
            publish(
                &state,
                LedgerEvent::TransactionRecorded {
                    record: receipt.record.clone(),
                },
            );
            publish_wallet(&state, &id, &receipt.wallet);
            Json(ReceiptResponse::from(receipt)).into_response()
        }
        Err(e) => ledger_error(&state, e),
    }
}

/// `POST /users/:id/exchange` — converts between coins and diamonds.
async fn exchange_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<ExchangeRequest>,
) -> Response {
    let _timer = state.metrics.op_latency_seconds.start_timer();
    match state.ledger.exchange(&id, req.direction, req.amount) {
        Ok(receipt) => {
            state.metrics.transactions_total.inc();
            publish(
                &state,
                LedgerEvent::TransactionRecorded {
                    record: receipt.record.clone(),
                },
            );
            publish_wallet(&state, &id, &receipt.wallet);
            Json(ReceiptResponse::from(receipt)).into_response()
        }
        Err(e) => ledger_error(&state, e),
    }
}

/// `POST /users/:id/transfer` — transfers to a mutual friend and notifies
/// the recipient's device.
async fn transfer_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<TransferRequest>,
) -> Response {
    let _timer = state.metrics.op_latency_seconds.start_timer();
    match state
        .ledger
        .transfer(&id, &req.recipient, req.currency, req.amount)
    {
        Ok(receipt) => {
            state.metrics.transactions_total.inc_by(2);
            state.metrics.transfers_total.inc();
            publish(
                &state,
                LedgerEvent::TransactionRecorded {
                    record: receipt.sent.clone(),
                },
            );
            publish(
                &state,
                LedgerEvent::TransactionRecorded {
                    record: receipt.received.clone(),
                },
            );
            publish_wallet(&state, &id, &receipt.sender_wallet);
            publish_wallet(&state, &req.recipient, &receipt.recipient_wallet);
            notify_user(
                &state,
                &req.recipient,
                "Transfer received",
                &receipt.received.description,
            )
            .await;
            Json(PairedReceiptResponse::from(receipt)).into_response()
        }
        Err(e) => ledger_error(&state, e),
    }
}

/// `POST /users/:id/gifts` — sends a gift; the recipient earns diamonds.
async fn gift_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<GiftRequest>,
) -> Response {
    let _timer = state.metrics.op_latency_seconds.start_timer();
    match state.ledger.gift(&id, &req.recipient, &req.gift) {
        Ok(receipt) => {
            state.metrics.transactions_total.inc_by(2);
            publish(
                &state,
                LedgerEvent::TransactionRecorded {
                    record: receipt.sent.clone(),
                },
            );
            publish(
                &state,
                LedgerEvent::TransactionRecorded {
                    record: receipt.received.clone(),
                },
            );
            publish_wallet(&state, &id, &receipt.sender_wallet);
            publish_wallet(&state, &req.recipient, &receipt.recipient_wallet);
            Json(PairedReceiptResponse::from(receipt)).into_response()
        }
        Err(e) => ledger_error(&state, e),
    }
}

/// `POST /users/:id/withdrawals` — files a withdrawal request.
async fn withdrawal_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let _timer = state.metrics.op_latency_seconds.start_timer();
    match state.ledger.request_withdrawal(&id) {
        Ok(receipt) => {
            state.metrics.transactions_total.inc();
            publish(
                &state,
                LedgerEvent::TransactionRecorded {
                    record: receipt.record.clone(),
                },
            );
            publish_wallet(&state, &id, &receipt.wallet);
            (StatusCode::ACCEPTED, Json(ReceiptResponse::from(receipt))).into_response()
        }
        Err(e) => ledger_error(&state, e),
    }
}

/// `POST /users/:id/orders` — records an order for the loyalty count.
async fn record_order_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<OrderRequest>,
) -> Response {
    match state.ledger.record_order(&id, req.status, req.total_millimes) {
        Ok(order) => (StatusCode::CREATED, Json(order)).into_response(),
        Err(e) => ledger_error(&state, e),
    }
}

// ---------------------------------------------------------------------------
// Handlers — push broadcast
// ---------------------------------------------------------------------------

/// `POST /broadcast` — pushes a notification to every user with a token,
/// chunked at the gateway's batch limit.
async fn broadcast_handler(
    State(state): State<AppState>,
    Json(req): Json<BroadcastRequest>,
) -> Response {
    let users = match state.ledger.db().users_with_push_tokens() {
        Ok(users) => users,
        Err(e) => return ledger_error(&state, LedgerError::Db(e)),
    };

    let messages: Vec<PushMessage> = users
        .iter()
        .filter_map(|u| {
            u.push_token
                .as_ref()
                .map(|t| PushMessage::new(t.as_str(), req.title.as_str(), req.body.as_str()))
        })
        .collect();

    let report = push::send_chunked(state.push.as_ref(), &messages).await;
    state
        .metrics
        .push_messages_sent_total
        .inc_by(report.delivered as u64);
    state.metrics.push_batches_total.inc_by(report.batches as u64);
    tracing::info!(
        recipients = messages.len(),
        batches = report.batches,
        failed = report.failed_batches,
        "broadcast dispatched"
    );

    Json(BroadcastResponse {
        recipients: messages.len(),
        report,
    })
    .into_response()
}

// ---------------------------------------------------------------------------
// Handlers — WebSocket
// ---------------------------------------------------------------------------

/// `GET /ws` — WebSocket upgrade for live event streaming.
///
/// Clients receive JSON-encoded [`LedgerEvent`] messages for each committed
/// operation. The connection is read-only from the server's perspective;
/// client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding broadcast events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.events.subscribe();
    state.metrics.ws_clients.inc();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload.into())).await.is_err() {
                            // Client disconnected.
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {
                        // Client messages are ignored — this is a push-only channel.
                    }
                    _ => break, // Disconnected or error.
                }
            }
        }
    }

    state.metrics.ws_clients.dec();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
