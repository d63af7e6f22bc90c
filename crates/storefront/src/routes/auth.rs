//! Authentication route handlers.
//!
//! Handles login, registration and logout with email and password. These are
//! the only places a browser's cart changes owner: the account's server-side
//! cart on login, an empty anonymous cart on logout.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::Layout;
use super::cart::switch_cart;
use crate::error::{clear_sentry_user, set_sentry_user};
use crate::middleware::{clear_current_user, set_current_user};
use crate::models::{CurrentUser, User};
use crate::services::auth::{AuthError, AuthService};
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Registration form data.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

/// Query parameters for error/success display.
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub success: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub layout: Layout,
    pub error: Option<String>,
    pub success: Option<String>,
}

/// Register page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub layout: Layout,
    pub error: Option<String>,
}

/// Shopper-facing text for an `?error=` code.
fn error_message(code: &str) -> String {
    match code {
        "credentials" => "Correo o contraseña incorrectos.",
        "password_mismatch" => "Las contraseñas no coinciden.",
        "password_too_short" => "La contraseña debe tener al menos 8 caracteres.",
        "invalid_email" => "El correo no es válido.",
        "email_taken" => "Ya existe una cuenta con este correo.",
        "session" => "No pudimos iniciar tu sesión. Inténtalo de nuevo.",
        _ => "Algo salió mal. Inténtalo de nuevo.",
    }
    .to_string()
}

// =============================================================================
// Session Helpers
// =============================================================================

/// Store `user` in the session and move the browser's cart to their account.
async fn start_session(state: &AppState, session: &Session, user: &User) -> Response {
    // New identity, new session id
    if let Err(e) = session.cycle_id().await {
        tracing::error!("Failed to cycle session id: {}", e);
        return Redirect::to("/auth/login?error=session").into_response();
    }
    if let Err(e) = set_current_user(session, &CurrentUser::from(user)).await {
        tracing::error!("Failed to set session: {}", e);
        return Redirect::to("/auth/login?error=session").into_response();
    }
    set_sentry_user(&user.id, Some(user.email.as_str()));

    if let Err(e) = switch_cart(state, session).await {
        // The cart stays anonymous until the next login
        tracing::warn!(user_id = %user.id, "Failed to switch cart after login: {}", e);
    }

    Redirect::to("/").into_response()
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login page.
pub async fn login_page(session: Session, Query(query): Query<MessageQuery>) -> impl IntoResponse {
    LoginTemplate {
        layout: Layout::for_session(&session).await,
        error: query.error.as_deref().map(error_message),
        success: query.success,
    }
}

/// Handle login form submission.
#[instrument(skip(state, session, form), fields(email = %form.email))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    let user = match AuthService::new(state.pool())
        .login_with_password(&form.email, &form.password)
        .await
    {
        Ok(user) => user,
        Err(AuthError::InvalidCredentials | AuthError::InvalidEmail(_)) => {
            return Redirect::to("/auth/login?error=credentials").into_response();
        }
        Err(e) => {
            tracing::error!("Login failed: {}", e);
            return Redirect::to("/auth/login?error=failed").into_response();
        }
    };

    start_session(&state, &session, &user).await
}

// =============================================================================
// Registration Routes
// =============================================================================

/// Display the registration page.
pub async fn register_page(
    session: Session,
    Query(query): Query<MessageQuery>,
) -> impl IntoResponse {
    RegisterTemplate {
        layout: Layout::for_session(&session).await,
        error: query.error.as_deref().map(error_message),
    }
}

/// Handle registration form submission. A new account is signed in at once.
#[instrument(skip(state, session, form), fields(email = %form.email))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Response {
    if form.password != form.password_confirm {
        return Redirect::to("/auth/register?error=password_mismatch").into_response();
    }

    let user = match AuthService::new(state.pool())
        .register_with_password(&form.email, &form.password)
        .await
    {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!("Registration failed: {}", e);
            let code = match e {
                AuthError::InvalidEmail(_) => "invalid_email",
                AuthError::WeakPassword(_) => "password_too_short",
                AuthError::UserAlreadyExists => "email_taken",
                _ => "failed",
            };
            return Redirect::to(&format!("/auth/register?error={code}")).into_response();
        }
    };

    tracing::info!(user_id = %user.id, "Account created");
    start_session(&state, &session, &user).await
}

// =============================================================================
// Logout
// =============================================================================

/// Handle logout.
///
/// The cart token stays in the session so the browser keeps an (empty)
/// anonymous cart.
#[instrument(skip(state, session))]
pub async fn logout(State(state): State<AppState>, session: Session) -> Response {
    if let Err(e) = clear_current_user(&session).await {
        tracing::error!("Failed to clear session: {}", e);
    }
    if let Err(e) = session.cycle_id().await {
        tracing::error!("Failed to cycle session id: {}", e);
    }
    clear_sentry_user();

    if let Err(e) = switch_cart(&state, &session).await {
        tracing::warn!("Failed to switch cart after logout: {}", e);
    }

    Redirect::to("/").into_response()
}
