//! HTTP Handlers

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Redirect};
use chrono::Utc;
use platform::cookie::{CookieSpec, extract_cookie};

use crate::application::{
    CallbackParams, MailMessage, SecondFactorMarker, SecondFactorState, SignInInput,
    SignUpInput, store_call,
};
use crate::domain::repository::CredentialStore;
use crate::domain::value_object::{email::Email, lookup_id::LookupId};
use crate::error::{AuthError, AuthResult};
use crate::presentation::dto::{
    AdminSearchRequest, EnrollResponse, LoginRequest, LoginResponse, OAuthLoginResponse,
    RegisterRequest, RegisterResponse, SecondFactorStatusResponse, UserResponse,
    ValidateCodeRequest, ValidateCodeResponse,
};
use crate::presentation::middleware::CurrentSession;
use crate::presentation::state::{Backend, IdentityState};

/// Session token cookie
pub const SESSION_COOKIE: &str = "jwt";
/// Second-factor marker cookie
pub const SECOND_FACTOR_COOKIE: &str = "second_factor";

fn session_cookie<B: Backend>(state: &IdentityState<B>) -> CookieSpec {
    CookieSpec::new(SESSION_COOKIE)
        .secure(state.config.cookie_secure)
        .max_age(state.config.session_ttl)
}

fn second_factor_cookie<B: Backend>(state: &IdentityState<B>) -> CookieSpec {
    CookieSpec::new(SECOND_FACTOR_COOKIE)
        .secure(state.config.cookie_secure)
        .max_age(state.config.second_factor_ttl)
}

// ============================================================================
// Registration / Login
// ============================================================================

/// POST /api/users/register
pub async fn register<B: Backend>(
    State(state): State<IdentityState<B>>,
    Json(req): Json<RegisterRequest>,
) -> AuthResult<impl IntoResponse> {
    let output = state
        .sign_up()
        .execute(SignUpInput {
            email: req.email,
            password: req.password,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User created".to_string(),
            user_id: output.lookup_id.to_string(),
        }),
    ))
}

/// POST /api/users/login
pub async fn login<B: Backend>(
    State(state): State<IdentityState<B>>,
    Json(req): Json<LoginRequest>,
) -> AuthResult<impl IntoResponse> {
    let output = state
        .sign_in()
        .execute(SignInInput {
            email: req.email,
            password: req.password,
        })
        .await?;

    let cookie = session_cookie(&state).build_set_cookie(&output.token);

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            user: UserResponse::from(&output.user),
            token: output.token,
            second_factor: output.second_factor,
        }),
    ))
}

/// GET /api/users/profile
pub async fn profile(Extension(session): Extension<CurrentSession>) -> Json<UserResponse> {
    Json(UserResponse::from(&session.user))
}

// ============================================================================
// OAuth
// ============================================================================

/// GET /api/oauth/google/login
pub async fn oauth_login<B: Backend>(
    State(state): State<IdentityState<B>>,
) -> AuthResult<impl IntoResponse> {
    let (url, _state) = state.reconciler().begin_login().await?;

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        Redirect::temporary(&url),
    ))
}

/// GET /api/oauth/google/callback
pub async fn oauth_callback<B: Backend>(
    State(state): State<IdentityState<B>>,
    Query(params): Query<CallbackParams>,
) -> AuthResult<impl IntoResponse> {
    let login = state.reconciler().complete_login(params).await?;

    let cookie = session_cookie(&state).build_set_cookie(&login.token);

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(OAuthLoginResponse {
            user: UserResponse::from(&login.user),
            token: login.token,
            created: login.created,
        }),
    ))
}

// ============================================================================
// Second factor (requires session)
// ============================================================================

/// POST /api/two/enroll
pub async fn two_enroll<B: Backend>(
    State(state): State<IdentityState<B>>,
    Extension(session): Extension<CurrentSession>,
) -> AuthResult<Json<EnrollResponse>> {
    let second_factor = state.second_factor();
    let secret = second_factor.enroll(&session.user).await?;

    let otpauth_url = second_factor.enrollment_uri(&session.user.email, &secret);
    let qr = second_factor.qr_base64(&session.user.email, &secret)?;

    Ok(Json(EnrollResponse {
        secret: secret.as_base32().to_string(),
        otpauth_url,
        qr_code: format!("data:image/png;base64,{qr}"),
    }))
}

/// POST /api/two/validate
pub async fn two_validate<B: Backend>(
    State(state): State<IdentityState<B>>,
    Extension(session): Extension<CurrentSession>,
    Json(req): Json<ValidateCodeRequest>,
) -> AuthResult<impl IntoResponse> {
    let marker = state.second_factor().satisfy(&session.user, &req.code).await?;

    let cookie = second_factor_cookie(&state).build_set_cookie(&marker);

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(ValidateCodeResponse {
            state: SecondFactorState::Authenticated,
        }),
    ))
}

/// GET /api/two/status
pub async fn two_status<B: Backend>(
    State(state): State<IdentityState<B>>,
    Extension(session): Extension<CurrentSession>,
    headers: HeaderMap,
) -> Json<SecondFactorStatusResponse> {
    let marker = SecondFactorMarker::from_config(&state.config);
    let satisfied = extract_cookie(&headers, SECOND_FACTOR_COOKIE)
        .is_some_and(|value| marker.verify(&value, &session.user.lookup_id));

    Json(SecondFactorStatusResponse {
        enrolled: session.user.is_totp_enrolled(),
        satisfied,
    })
}

// ============================================================================
// Admin (requires session + admin role; audited)
// ============================================================================

/// GET /api/admin/profile
pub async fn admin_profile<B: Backend>(
    State(state): State<IdentityState<B>>,
    Extension(session): Extension<CurrentSession>,
) -> Json<UserResponse> {
    if let Some(to) = &state.config.admin_notify_email {
        state.dispatcher.mail(MailMessage {
            to: to.clone(),
            subject: "Admin profile accessed".to_string(),
            body: format!(
                "Admin {} ({}) accessed their profile at {}",
                session.user.email,
                session.user.lookup_id,
                Utc::now().to_rfc3339()
            ),
        });
    }

    Json(UserResponse::from(&session.user))
}

/// GET /api/admin/users/{lookup_id}
pub async fn admin_get_user<B: Backend>(
    State(state): State<IdentityState<B>>,
    Path(lookup_id): Path<String>,
) -> AuthResult<Json<UserResponse>> {
    let lookup_id =
        LookupId::parse(&lookup_id).ok_or(AuthError::ParamsMismatch("lookup id is required"))?;

    let user = store_call(state.config.store_timeout, state.store.get_by_lookup_id(&lookup_id))
        .await?
        .ok_or(AuthError::NoMatchingUser)?;

    Ok(Json(UserResponse::from(&user)))
}

/// POST /api/admin/search
pub async fn admin_search<B: Backend>(
    State(state): State<IdentityState<B>>,
    Json(req): Json<AdminSearchRequest>,
) -> AuthResult<Json<UserResponse>> {
    let email = Email::parse(&req.email)?;

    let user = store_call(state.config.store_timeout, state.store.get_by_email(&email))
        .await?
        .ok_or(AuthError::NoMatchingUser)?;

    Ok(Json(UserResponse::from(&user)))
}
