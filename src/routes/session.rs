use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{error, info, warn};

use crate::errors::AppError;
use crate::models::{SessionResponse, SignInRequest, User};
use crate::services::sync_service::load_from_cloud;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(current_session).post(sign_in).delete(sign_out))
}

fn session_response(state: &AppState, user: User) -> SessionResponse {
    let (holdings, virtual_cash) = {
        let ledger = state.ledger.lock();
        (ledger.holdings().len(), ledger.virtual_cash())
    };
    SessionResponse {
        user,
        holdings,
        virtual_cash,
        watchlist: state.watchlist.lock().stocks().len(),
    }
}

/// Verify the access token, pull the account from the cloud mirror, then
/// start the session with that account. If the mirror cannot be read the
/// sign-in is refused and local state is left alone.
async fn sign_in(
    State(state): State<AppState>,
    Json(input): Json<SignInRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let user = state.verifier.verify(&input.access_token).map_err(|e| {
        warn!("POST /api/session - rejected token: {}", e);
        e
    })?;
    info!("POST /api/session - Signing in {}", user.id);

    let snapshot = load_from_cloud(state.cloud.as_ref(), user.id).await.map_err(|e| {
        error!("POST /api/session - cloud account unavailable for {}: {}", user.id, e);
        AppError::Unavailable("Account storage is unavailable, try again later".to_string())
    })?;
    state.begin_session(user.clone(), snapshot);

    Ok(Json(session_response(&state, user)))
}

async fn sign_out(State(state): State<AppState>) -> StatusCode {
    info!("DELETE /api/session - Signing out");
    state.session.sign_out();
    state.chat.clear_messages();
    state.chat.clear_context();
    state.checkpoint();
    StatusCode::NO_CONTENT
}

async fn current_session(State(state): State<AppState>) -> Result<Json<SessionResponse>, AppError> {
    let user = state.session.current_user().ok_or(AppError::Unauthorized)?;
    Ok(Json(session_response(&state, user)))
}
