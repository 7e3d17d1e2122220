//! Authentication routes: login, signup, logout, profile, password recovery.

use axum::{extract::State, Json};
use serde::Serialize;
use validator::Validate;

use crate::errors::{ApiResponse, AppError};
use crate::middleware::auth::CurrentUser;
use crate::models::user::{
    Credentials, ForgotPasswordRequest, ResetPasswordRequest, SessionResponse, SignupRequest, User,
};
use crate::services::auth::SignUp;
use crate::AppState;

/// Sign-up result: a session, or a note that the email must be confirmed.
#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub user: User,
    pub session: Option<SessionResponse>,
    pub confirmation_required: bool,
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<Credentials>,
) -> Result<Json<ApiResponse<SessionResponse>>, AppError> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let session = state.identity.sign_in(&body.email, &body.password).await?;
    tracing::info!(user_id = %session.user.id, "User signed in");
    Ok(ApiResponse::success(SessionResponse::from(session)))
}

/// POST /api/v1/auth/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupRequest>,
) -> Result<Json<ApiResponse<SignupResponse>>, AppError> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let response = match state
        .identity
        .sign_up(&body.email, &body.password, body.name.trim())
        .await?
    {
        SignUp::Session(session) => SignupResponse {
            user: session.user.clone(),
            session: Some(SessionResponse::from(session)),
            confirmation_required: false,
        },
        SignUp::ConfirmationRequired(user) => SignupResponse {
            user,
            session: None,
            confirmation_required: true,
        },
    };

    Ok(ApiResponse::success(response))
}

/// POST /api/v1/auth/logout — revokes the session at the provider.
pub async fn logout(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> Result<Json<ApiResponse<&'static str>>, AppError> {
    state.identity.sign_out(&current_user.access_token).await?;
    Ok(ApiResponse::success("Logged out successfully"))
}

/// GET /api/v1/auth/me — current user profile
pub async fn me(current_user: CurrentUser) -> Json<ApiResponse<User>> {
    ApiResponse::success(current_user.user)
}

/// POST /api/v1/auth/forgot-password — same answer whether or not the account exists
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<&'static str>>, AppError> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let redirect_to = format!("{}/reset-password", state.config.frontend_url.trim_end_matches('/'));
    state
        .identity
        .request_password_reset(body.email.trim(), &redirect_to)
        .await?;
    Ok(ApiResponse::success(
        "If an account exists for that email, a reset link has been sent",
    ))
}

/// POST /api/v1/auth/reset-password — bearer is the recovery token from the emailed link
pub async fn reset_password(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<User>>, AppError> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let user = state
        .identity
        .update_password(&current_user.access_token, &body.password)
        .await?;
    Ok(ApiResponse::success(user))
}
