//! HTTP API (§6): a versioned `/v1` Axum `Router` over `AppState`, JSON
//! request/response bodies, `Authorization: Bearer` for protected routes.
//! Each handler is a thin adapter from the wire shape onto the domain
//! modules (`auth`, `staking`, `withdrawals`, `db::*`) — no business logic
//! lives here, matching the teacher's own api.rs, which only formats
//! responses around `db::*` calls.

use crate::auth::{self, AuthUser};
use crate::config::CorsConfig;
use crate::error::{codes, ApiError, ApiResult, ValidationError};
use crate::state::AppState;
use crate::types::{Money, Role};
use crate::{audit, notifications, staking, withdrawals};
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get, post};
use axum::Router;
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::str::FromStr;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::GovernorLayer;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

pub fn router(state: AppState, cors: &CorsConfig) -> Router {
    let auth_governor = GovernorConfigBuilder::default()
        .per_second(1)
        .burst_size(5)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("valid governor config");

    let auth_routes = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/sessions", get(list_sessions))
        .route("/sessions/:id", delete(revoke_session))
        .route("/2fa/setup", post(begin_2fa_setup))
        .route("/2fa/verify", post(verify_2fa_setup))
        .route("/2fa/disable", post(disable_2fa))
        .layer(GovernorLayer { config: std::sync::Arc::new(auth_governor) });

    let v1 = Router::new()
        .nest("/auth", auth_routes)
        .route("/user/profile", get(user_profile))
        .route("/user/dashboard", get(user_dashboard))
        .route("/user/balances", get(user_balances))
        .route("/pools", get(list_pools))
        .route("/pools/:id/calculator", get(pool_calculator))
        .route("/stakes", post(create_stake))
        .route("/stakes/:id/unstake", post(unstake))
        .route("/stakes/:id/claim", post(claim))
        .route("/deposits/address", post(allocate_deposit_address))
        .route("/deposits", get(list_deposits))
        .route("/withdrawals", post(submit_withdrawal))
        .route("/withdrawals/:id", get(get_withdrawal))
        .route("/admin/withdrawals", get(admin_list_withdrawals))
        .route("/admin/withdrawals/:id/approve", post(admin_approve_withdrawal))
        .route("/admin/withdrawals/:id/reject", post(admin_reject_withdrawal))
        .route("/admin/withdrawals/:id/mark-paid", post(admin_mark_paid))
        .route("/admin/pools", post(admin_create_pool))
        .route("/admin/pools/:id/apr", post(admin_set_apr))
        .route("/admin/treasury", post(admin_create_treasury_wallet));

    let cors_layer = build_cors_layer(cors);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .nest("/v1", v1)
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    if cors.allowed_origins.is_empty() {
        return CorsLayer::new().allow_methods([Method::GET, Method::POST, Method::DELETE]);
    }
    let origins: Vec<HeaderValue> = cors
        .allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(tower_http::cors::Any)
}

async fn health() -> &'static str {
    "OK"
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "failed to encode prometheus metrics");
    }
    (StatusCode::OK, buffer)
}

fn bearer_user_agent(headers: &axum::http::HeaderMap) -> Option<String> {
    headers.get(axum::http::header::USER_AGENT).and_then(|v| v.to_str().ok()).map(str::to_string)
}

fn parse_money(field: &str, raw: &str) -> ApiResult<Money> {
    Money::from_str(raw).map_err(|_| ApiError::Validation(vec![ValidationError::new(field, "must be a decimal number")]))
}

// ---- auth ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

async fn register(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<TokenResponse>)> {
    if req.password.len() < 12 {
        return Err(ApiError::Validation(vec![ValidationError::new("password", "must be at least 12 characters")]));
    }
    let registered = auth::register(&state, &req.email, &req.password).await?;
    audit::record(state.db(), audit::AuditEvent {
        actor_id: Some(registered.user_id),
        actor_email: Some(&registered.email),
        action: "user.register",
        entity: "user",
        entity_id: &registered.user_id.to_string(),
        before: None,
        after: None,
        ip_address: Some(&addr.ip().to_string()),
        user_agent: bearer_user_agent(&headers).as_deref(),
    })
    .await
    .map_err(ApiError::TransientExternal)?;

    let outcome = auth::login(&state, &req.email, &req.password, None, bearer_user_agent(&headers).as_deref(), Some(&addr.ip().to_string())).await?;
    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            access_token: outcome.access_token,
            refresh_token: outcome.refresh_token,
            expires_in: state.jwt().access_expires_secs,
        }),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    email: String,
    password: String,
    totp_code: Option<String>,
}

async fn login(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let outcome = auth::login(
        &state,
        &req.email,
        &req.password,
        req.totp_code.as_deref(),
        bearer_user_agent(&headers).as_deref(),
        Some(&addr.ip().to_string()),
    )
    .await?;
    Ok(Json(TokenResponse {
        access_token: outcome.access_token,
        refresh_token: outcome.refresh_token,
        expires_in: state.jwt().access_expires_secs,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    refresh_token: String,
}

async fn refresh(State(state): State<AppState>, Json(req): Json<RefreshRequest>) -> ApiResult<Json<TokenResponse>> {
    let outcome = auth::refresh(&state, &req.refresh_token).await?;
    Ok(Json(TokenResponse {
        access_token: outcome.access_token,
        refresh_token: outcome.refresh_token,
        expires_in: state.jwt().access_expires_secs,
    }))
}

async fn logout(State(state): State<AppState>, Json(req): Json<RefreshRequest>) -> ApiResult<StatusCode> {
    auth::logout(&state, &req.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_sessions(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Vec<crate::db::Session>>> {
    let sessions = crate::db::sessions::list_sessions_for_user(state.db(), user.user_id).await.map_err(ApiError::TransientExternal)?;
    Ok(Json(sessions))
}

async fn revoke_session(State(state): State<AppState>, user: AuthUser, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    let Some(session) = crate::db::sessions::find_session_by_id(state.db(), id).await.map_err(ApiError::TransientExternal)? else {
        return Err(ApiError::NotFound("session not found".into()));
    };
    if session.user_id != user.user_id {
        return Err(ApiError::Forbidden("not your session".into()));
    }
    crate::db::sessions::revoke_session(state.db(), id).await.map_err(ApiError::TransientExternal)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TotpSetupResponse {
    secret: String,
    qr_code_url: String,
}

async fn begin_2fa_setup(State(state): State<AppState>, user: AuthUser) -> ApiResult<(StatusCode, Json<TotpSetupResponse>)> {
    let Some(account) = crate::db::users::find_user_by_id(state.db(), user.user_id).await.map_err(ApiError::TransientExternal)? else {
        return Err(ApiError::Fatal);
    };
    let setup = auth::begin_two_factor_setup(&state, user.user_id, &account.email).await?;
    Ok((
        StatusCode::CREATED,
        Json(TotpSetupResponse { secret: String::new(), qr_code_url: setup.provisioning_uri }),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TotpCodeRequest {
    totp_code: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecoveryCodesResponse {
    recovery_codes: Vec<String>,
}

async fn verify_2fa_setup(State(state): State<AppState>, user: AuthUser, Json(req): Json<TotpCodeRequest>) -> ApiResult<Json<RecoveryCodesResponse>> {
    let codes = auth::confirm_two_factor_setup(&state, user.user_id, &req.totp_code).await?;
    Ok(Json(RecoveryCodesResponse { recovery_codes: codes }))
}

async fn disable_2fa(State(state): State<AppState>, user: AuthUser, Json(req): Json<TotpCodeRequest>) -> ApiResult<StatusCode> {
    auth::verify_two_factor_code(&state, user.user_id, &req.totp_code).await?;
    crate::db::users::mark_two_factor_enabled(state.db(), user.user_id, false).await.map_err(ApiError::TransientExternal)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- user ----

async fn user_profile(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<crate::db::User>> {
    let mut account = crate::db::users::find_user_by_id(state.db(), user.user_id).await.map_err(ApiError::TransientExternal)?.ok_or(ApiError::Fatal)?;
    account.password_hash = String::new();
    Ok(Json(account))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DashboardResponse {
    balances: Vec<crate::db::BalanceCacheRow>,
    stake_positions: Vec<crate::db::StakePosition>,
    pending_withdrawals: usize,
}

async fn user_dashboard(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<DashboardResponse>> {
    let balances = crate::db::ledger::list_balance_caches_for_user(state.db(), user.user_id).await.map_err(ApiError::TransientExternal)?;
    let stake_positions = crate::db::stakes::list_stake_positions_for_user(state.db(), user.user_id).await.map_err(ApiError::TransientExternal)?;
    let withdrawals = crate::db::withdrawals::list_withdrawal_requests_for_user(state.db(), user.user_id).await.map_err(ApiError::TransientExternal)?;
    let pending_withdrawals = withdrawals.iter().filter(|w| w.status == "pending_review" || w.status == "approved" || w.status == "processing").count();
    Ok(Json(DashboardResponse { balances, stake_positions, pending_withdrawals }))
}

async fn user_balances(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Vec<crate::db::BalanceCacheRow>>> {
    let balances = crate::db::ledger::list_balance_caches_for_user(state.db(), user.user_id).await.map_err(ApiError::TransientExternal)?;
    Ok(Json(balances))
}

// ---- pools ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPoolsQuery {
    asset_id: Option<Uuid>,
    #[serde(rename = "type")]
    pool_type: Option<String>,
}

async fn list_pools(State(state): State<AppState>, Query(q): Query<ListPoolsQuery>) -> ApiResult<Json<Vec<crate::db::Pool>>> {
    let pools = staking::list_pools(state.db(), true).await?;
    let filtered = pools
        .into_iter()
        .filter(|p| q.asset_id.map(|id| p.asset_id == id).unwrap_or(true))
        .filter(|p| q.pool_type.as_deref().map(|t| p.pool_type == t).unwrap_or(true))
        .collect();
    Ok(Json(filtered))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalculatorQuery {
    amount: String,
    days: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CalculatorResponse {
    estimated_rewards: Money,
    apr: Money,
    lock_days: i64,
}

const SECONDS_PER_YEAR: i64 = 365 * 24 * 60 * 60;

async fn pool_calculator(State(state): State<AppState>, Path(id): Path<Uuid>, Query(q): Query<CalculatorQuery>) -> ApiResult<Json<CalculatorResponse>> {
    let amount = parse_money("amount", &q.amount)?;
    let Some(pool) = crate::db::catalog::find_pool(state.db(), id).await.map_err(ApiError::TransientExternal)? else {
        return Err(ApiError::NotFound("pool not found".into()));
    };
    let apr = crate::db::catalog::find_effective_apr_schedule(state.db(), id, state.clock().now())
        .await
        .map_err(ApiError::TransientExternal)?
        .map(|s| s.apr)
        .unwrap_or_else(|| pool.current_apr.clone());
    let estimated_rewards = amount * apr.clone() / Money::from(100) * Money::from(q.days * 86_400) / Money::from(SECONDS_PER_YEAR);
    Ok(Json(CalculatorResponse { estimated_rewards, apr, lock_days: q.days }))
}

// ---- stakes ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateStakeRequest {
    pool_id: Uuid,
    amount: String,
}

async fn create_stake(State(state): State<AppState>, user: AuthUser, Json(req): Json<CreateStakeRequest>) -> ApiResult<(StatusCode, Json<crate::db::StakePosition>)> {
    let amount = parse_money("amount", &req.amount)?;
    let Some(pool) = crate::db::catalog::find_pool(state.db(), req.pool_id).await.map_err(ApiError::TransientExternal)? else {
        return Err(ApiError::NotFound("pool not found".into()));
    };
    let Some(asset) = crate::db::catalog::find_asset(state.db(), pool.asset_id).await.map_err(ApiError::TransientExternal)? else {
        return Err(ApiError::Fatal);
    };
    if !asset.is_active {
        return Err(ApiError::DomainRejection { code: codes::ASSET_INACTIVE, message: "asset is not active".into() });
    }
    let position = staking::open_stake(state.db(), state.clock().as_ref(), user.user_id, req.pool_id, asset.id, asset.chain_id, amount).await?;
    notifications::notify(state.db(), user.user_id, "stake_opened", "Stake opened", &format!("Your stake in {} was opened", pool.name), serde_json::json!({ "position_id": position.id })).await;
    Ok((StatusCode::CREATED, Json(position)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UnstakeResponse {
    status: String,
    cooldown_ends_at: Option<chrono::DateTime<chrono::Utc>>,
}

async fn unstake(State(state): State<AppState>, user: AuthUser, Path(id): Path<Uuid>) -> ApiResult<Json<UnstakeResponse>> {
    let position = staking::request_unstake(state.db(), state.clock().as_ref(), user.user_id, id).await?;
    Ok(Json(UnstakeResponse { status: position.status, cooldown_ends_at: position.cooldown_ends_at }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClaimResponse {
    claimed_amount: Money,
}

async fn claim(State(state): State<AppState>, user: AuthUser, Path(id): Path<Uuid>) -> ApiResult<Json<ClaimResponse>> {
    let claimed_amount = staking::claim_rewards(state.db(), user.user_id, id).await?;
    Ok(Json(ClaimResponse { claimed_amount }))
}

// ---- deposits ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AllocateDepositAddressRequest {
    chain_id: Uuid,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DepositAddressResponse {
    address: String,
    chain_id: Uuid,
    instructions: String,
}

/// Derives a placeholder deposit address from the allocation cursor. Real
/// HD-wallet derivation is an external signer's job (out of scope, §0); this
/// closure only needs to hand back a stable, unique-looking address shape.
fn placeholder_derive_address(index: i64) -> String {
    format!("0x{index:040x}")
}

async fn allocate_deposit_address(State(state): State<AppState>, user: AuthUser, Json(req): Json<AllocateDepositAddressRequest>) -> ApiResult<Json<DepositAddressResponse>> {
    if let Some(existing) = crate::db::deposits::find_deposit_address(state.db(), user.user_id, req.chain_id).await.map_err(ApiError::TransientExternal)? {
        return Ok(Json(DepositAddressResponse {
            address: existing.address,
            chain_id: existing.chain_id,
            instructions: "Send only supported assets to this address.".into(),
        }));
    }
    let chains = crate::db::catalog::list_active_chains(state.db()).await.map_err(ApiError::TransientExternal)?;
    let Some(chain) = chains.into_iter().find(|c| c.id == req.chain_id) else {
        return Err(ApiError::NotFound("chain not found".into()));
    };
    let address = crate::db::deposits::allocate_deposit_address(state.db(), user.user_id, chain.id, &chain.slug, placeholder_derive_address)
        .await
        .map_err(ApiError::TransientExternal)?;
    Ok(Json(DepositAddressResponse {
        address: address.address,
        chain_id: address.chain_id,
        instructions: "Send only supported assets to this address.".into(),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDepositsQuery {
    chain_id: Option<Uuid>,
    status: Option<String>,
}

async fn list_deposits(State(state): State<AppState>, user: AuthUser, Query(q): Query<ListDepositsQuery>) -> ApiResult<Json<Vec<crate::db::Deposit>>> {
    let deposits = crate::db::deposits::list_deposits_for_user(state.db(), user.user_id).await.map_err(ApiError::TransientExternal)?;
    let filtered = deposits
        .into_iter()
        .filter(|d| q.chain_id.map(|id| d.chain_id == id).unwrap_or(true))
        .filter(|d| q.status.as_deref().map(|s| d.status == s).unwrap_or(true))
        .collect();
    Ok(Json(filtered))
}

// ---- withdrawals ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitWithdrawalRequest {
    asset_id: Uuid,
    chain_id: Uuid,
    amount: String,
    destination_address: String,
    user_notes: Option<String>,
    idempotency_key: String,
}

async fn submit_withdrawal(State(state): State<AppState>, user: AuthUser, Json(req): Json<SubmitWithdrawalRequest>) -> ApiResult<(StatusCode, Json<crate::db::WithdrawalRequest>)> {
    let amount = parse_money("amount", &req.amount)?;
    if !crate::types::EvmAddress::is_well_formed(&req.destination_address) {
        return Err(ApiError::Validation(vec![ValidationError::new("destinationAddress", "must be a 0x-prefixed 20-byte address")]));
    }
    let Some(asset) = crate::db::catalog::find_asset(state.db(), req.asset_id).await.map_err(ApiError::TransientExternal)? else {
        return Err(ApiError::NotFound("asset not found".into()));
    };

    let withdrawal = withdrawals::submit(
        state.db(),
        state.clock().as_ref(),
        state.security(),
        withdrawals::SubmitWithdrawal {
            user_id: user.user_id,
            asset_id: req.asset_id,
            chain_id: req.chain_id,
            amount,
            price_usd: asset.price_usd,
            destination_address: req.destination_address,
            user_notes: req.user_notes,
            idempotency_key: req.idempotency_key,
        },
    )
    .await?;

    notifications::notify(
        state.db(),
        user.user_id,
        "withdrawal_submitted",
        "Withdrawal submitted",
        "Your withdrawal request is pending review.",
        serde_json::json!({ "withdrawal_id": withdrawal.id }),
    )
    .await;

    Ok((StatusCode::CREATED, Json(withdrawal)))
}

async fn get_withdrawal(State(state): State<AppState>, user: AuthUser, Path(id): Path<Uuid>) -> ApiResult<Json<crate::db::WithdrawalRequest>> {
    let Some(withdrawal) = crate::db::withdrawals::find_withdrawal_request(state.db(), id).await.map_err(ApiError::TransientExternal)? else {
        return Err(ApiError::NotFound("withdrawal request not found".into()));
    };
    if withdrawal.user_id != user.user_id {
        user.require(Role::Admin)?;
    }
    Ok(Json(withdrawal))
}

// ---- admin: withdrawals ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdminListWithdrawalsQuery {
    status: Option<String>,
    page: Option<i64>,
    limit: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PagedResponse<T> {
    items: Vec<T>,
    total: usize,
    page: i64,
    limit: i64,
    total_pages: i64,
}

async fn admin_list_withdrawals(State(state): State<AppState>, user: AuthUser, Query(q): Query<AdminListWithdrawalsQuery>) -> ApiResult<Json<PagedResponse<crate::db::WithdrawalRequest>>> {
    user.require(Role::Admin)?;
    let status = q.status.as_deref().unwrap_or("pending_review");
    let all = crate::db::withdrawals::list_withdrawal_requests_by_status(state.db(), status).await.map_err(ApiError::TransientExternal)?;
    let limit = q.limit.unwrap_or(20).max(1);
    let page = q.page.unwrap_or(1).max(1);
    let total = all.len();
    let total_pages = (total as i64 + limit - 1) / limit;
    let start = ((page - 1) * limit) as usize;
    let items = all.into_iter().skip(start).take(limit as usize).collect();
    Ok(Json(PagedResponse { items, total, page, limit, total_pages }))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct AdminNotesRequest {
    admin_notes: Option<String>,
}

async fn admin_approve_withdrawal(State(state): State<AppState>, user: AuthUser, Path(id): Path<Uuid>, Json(req): Json<AdminNotesRequest>) -> ApiResult<StatusCode> {
    user.require(Role::Admin)?;
    withdrawals::approve(state.db(), id, user.user_id, req.admin_notes.as_deref()).await?;
    audit::record(state.db(), audit::AuditEvent {
        actor_id: Some(user.user_id),
        actor_email: None,
        action: "withdrawal.approve",
        entity: "withdrawal_request",
        entity_id: &id.to_string(),
        before: None,
        after: req.admin_notes.map(|n| serde_json::json!({ "adminNotes": n })),
        ip_address: None,
        user_agent: None,
    })
    .await
    .map_err(ApiError::TransientExternal)?;
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RejectWithdrawalRequest {
    admin_notes: String,
}

async fn admin_reject_withdrawal(State(state): State<AppState>, user: AuthUser, Path(id): Path<Uuid>, Json(req): Json<RejectWithdrawalRequest>) -> ApiResult<StatusCode> {
    user.require(Role::Admin)?;
    if req.admin_notes.trim().is_empty() {
        return Err(ApiError::Validation(vec![ValidationError::new("adminNotes", "must not be empty")]));
    }
    withdrawals::reject(state.db(), id, user.user_id, &req.admin_notes).await?;
    audit::record(state.db(), audit::AuditEvent {
        actor_id: Some(user.user_id),
        actor_email: None,
        action: "withdrawal.reject",
        entity: "withdrawal_request",
        entity_id: &id.to_string(),
        before: None,
        after: Some(serde_json::json!({ "adminNotes": req.admin_notes })),
        ip_address: None,
        user_agent: None,
    })
    .await
    .map_err(ApiError::TransientExternal)?;
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkPaidRequest {
    proof_url: Option<String>,
    admin_notes: String,
}

async fn admin_mark_paid(State(state): State<AppState>, user: AuthUser, Path(id): Path<Uuid>, Json(req): Json<MarkPaidRequest>) -> ApiResult<StatusCode> {
    user.require(Role::Admin)?;
    if req.admin_notes.trim().is_empty() {
        return Err(ApiError::Validation(vec![ValidationError::new("adminNotes", "must not be empty")]));
    }
    withdrawals::mark_paid_manual(state.db(), id, req.proof_url.as_deref(), &req.admin_notes).await?;
    audit::record(state.db(), audit::AuditEvent {
        actor_id: Some(user.user_id),
        actor_email: None,
        action: "withdrawal.mark_paid",
        entity: "withdrawal_request",
        entity_id: &id.to_string(),
        before: None,
        after: Some(serde_json::json!({ "adminNotes": req.admin_notes, "proofUrl": req.proof_url })),
        ip_address: None,
        user_agent: None,
    })
    .await
    .map_err(ApiError::TransientExternal)?;
    Ok(StatusCode::OK)
}

// ---- admin: pools & treasury ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePoolRequest {
    name: String,
    slug: String,
    asset_id: Uuid,
    pool_type: String,
    lock_days: i32,
    apr: String,
    min_stake: String,
    max_stake: Option<String>,
    total_capacity: Option<String>,
    cooldown_hours: i32,
}

async fn admin_create_pool(State(state): State<AppState>, user: AuthUser, Json(req): Json<CreatePoolRequest>) -> ApiResult<(StatusCode, Json<crate::db::Pool>)> {
    user.require(Role::Admin)?;
    let apr = parse_money("apr", &req.apr)?;
    let min_stake = parse_money("minStake", &req.min_stake)?;
    let max_stake = req.max_stake.as_deref().map(|s| parse_money("maxStake", s)).transpose()?;
    let total_capacity = req.total_capacity.as_deref().map(|s| parse_money("totalCapacity", s)).transpose()?;

    let pool = sqlx::query_as::<_, crate::db::Pool>(
        r#"INSERT INTO pools (name, slug, asset_id, pool_type, lock_days, current_apr, min_stake, max_stake, total_capacity, cooldown_hours)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
           RETURNING id, name, slug, asset_id, pool_type, lock_days, current_apr, min_stake, max_stake, total_capacity, total_staked, cooldown_hours, is_active"#,
    )
    .bind(&req.name)
    .bind(&req.slug)
    .bind(req.asset_id)
    .bind(&req.pool_type)
    .bind(req.lock_days)
    .bind(&apr)
    .bind(&min_stake)
    .bind(&max_stake)
    .bind(&total_capacity)
    .bind(req.cooldown_hours)
    .fetch_one(state.db())
    .await
    .map_err(|e| ApiError::TransientExternal(e.into()))?;

    crate::db::catalog::insert_apr_schedule(state.db(), pool.id, &apr, state.clock().now()).await.map_err(ApiError::TransientExternal)?;

    Ok((StatusCode::CREATED, Json(pool)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetAprRequest {
    new_apr: String,
    effective_from: chrono::DateTime<chrono::Utc>,
}

async fn admin_set_apr(State(state): State<AppState>, user: AuthUser, Path(id): Path<Uuid>, Json(req): Json<SetAprRequest>) -> ApiResult<(StatusCode, Json<crate::db::AprSchedule>)> {
    user.require(Role::Admin)?;
    let apr = parse_money("newApr", &req.new_apr)?;
    let schedule = crate::db::catalog::insert_apr_schedule(state.db(), id, &apr, req.effective_from).await.map_err(ApiError::TransientExternal)?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTreasuryWalletRequest {
    chain_id: Uuid,
    address: String,
    label: Option<String>,
    private_key: String,
}

async fn admin_create_treasury_wallet(State(state): State<AppState>, user: AuthUser, Json(req): Json<CreateTreasuryWalletRequest>) -> ApiResult<StatusCode> {
    // Treasury-mutating endpoints require SUPER_ADMIN (§4.5).
    user.require(Role::SuperAdmin)?;
    let (ciphertext, nonce) = crate::crypto::encrypt(&state.master_key().0, crate::crypto::TREASURY_KEY_DOMAIN, req.private_key.as_bytes())
        .map_err(ApiError::TransientExternal)?;

    sqlx::query(
        r#"INSERT INTO treasury_wallets (chain_id, address, label, encrypted_private_key, nonce)
           VALUES ($1, $2, $3, $4, $5)"#,
    )
    .bind(req.chain_id)
    .bind(&req.address)
    .bind(&req.label)
    .bind(&ciphertext)
    .bind(&nonce)
    .execute(state.db())
    .await
    .map_err(|e| ApiError::TransientExternal(e.into()))?;

    audit::record(state.db(), audit::AuditEvent {
        actor_id: Some(user.user_id),
        actor_email: None,
        action: "treasury.create_wallet",
        entity: "treasury_wallet",
        entity_id: &req.address,
        before: None,
        after: Some(serde_json::json!({ "chainId": req.chain_id, "address": req.address, "label": req.label })),
        ip_address: None,
        user_agent: None,
    })
    .await
    .map_err(ApiError::TransientExternal)?;

    Ok(StatusCode::CREATED)
}
