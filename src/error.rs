//! Error types for the pim-tui application.
//!
//! Uses `thiserror` for library-style errors with automatic `Display` and `Error` implementations.

use std::fmt;

use thiserror::Error;

/// Substrings that mark a credential failure as "sign-in required" rather than
/// a transient network problem.
const SIGN_IN_MARKERS: &[&str] = &[
    "credential",
    "login",
    "token",
    "unauthorized",
    "expired",
    "aadsts",
    "interaction required",
    "not signed in",
];

/// Top-level application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Batch(#[from] BatchError),
}

/// Authentication-related errors.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    #[error("Not signed in: {0}")]
    NotSignedIn(String),

    #[error("Token request failed: {0}")]
    TokenRequestFailed(String),

    #[error("Azure CLI unavailable: {0}")]
    CliUnavailable(String),

    #[error("OAuth2 authorization failed: {0}")]
    OAuthFailed(String),

    #[error("Invalid authorization code")]
    InvalidAuthCode,

    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("State validation failed (possible CSRF attack)")]
    StateValidationFailed,

    #[error("OAuth callback timeout")]
    CallbackTimeout,

    #[error("Sign-in did not finish within {0} seconds")]
    LoginTimeout(u64),

    #[error("User cancelled authentication")]
    UserCancelled,
}

impl AuthError {
    /// Returns true if the user has to sign in (again) before anything else works.
    pub fn requires_sign_in(&self) -> bool {
        match self {
            Self::NotSignedIn(_) | Self::TokenRefreshFailed(_) => true,
            Self::TokenRequestFailed(msg) | Self::CliUnavailable(msg) => looks_like_sign_in(msg),
            _ => false,
        }
    }
}

/// Classify free-form credential error text.
pub fn looks_like_sign_in(message: &str) -> bool {
    let lower = message.to_lowercase();
    SIGN_IN_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Errors raised by the REST gateway and the services built on it.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("Request failed after {attempts} attempts: rate limited (429)")]
    RateLimitExhausted { attempts: u32 },

    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Request cancelled")]
    Cancelled,
}

impl ApiError {
    /// Returns true if this error means the session is missing or rejected.
    pub fn requires_sign_in(&self) -> bool {
        match self {
            Self::Auth(e) => e.requires_sign_in(),
            Self::Status { status, .. } => *status == 401,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Rejected user input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Justification is required")]
    JustificationRequired,

    #[error("Justification is too long ({len} characters, maximum {max})")]
    JustificationTooLong { len: usize, max: usize },

    #[error("Justification contains control characters")]
    JustificationControlChars,
}

/// An activation or deactivation batch that stopped partway.
///
/// Items before `completed` were sent to Azure and are not rolled back.
#[derive(Error, Debug, Clone)]
#[error("{item} failed after {completed} of {total} completed: {error}")]
pub struct BatchError {
    pub completed: usize,
    pub total: usize,
    pub item: String,
    pub error: ApiError,
}

/// Where a failed fetch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchSource {
    Auth,
    Tenant,
    UserInfo,
    Roles,
    Groups,
    Subscriptions,
}

impl FetchSource {
    /// Fatal sources block the UI; soft sources only log.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Auth | Self::Tenant)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Tenant => "tenant",
            Self::UserInfo => "user",
            Self::Roles => "roles",
            Self::Groups => "groups",
            Self::Subscriptions => "subscriptions",
        }
    }
}

impl fmt::Display for FetchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fetch failure tagged with its source.
#[derive(Error, Debug, Clone)]
#[error("failed to load {origin}: {error}")]
pub struct FetchError {
    pub origin: FetchSource,
    pub error: ApiError,
}

impl FetchError {
    pub fn new(origin: FetchSource, error: ApiError) -> Self {
        Self { origin, error }
    }
}

impl AppError {
    /// Returns a user-friendly message for display in the UI.
    pub fn user_message(&self) -> &str {
        match self {
            Self::Auth(e) if e.requires_sign_in() => "Session expired. Please sign in again.",
            Self::Auth(AuthError::CallbackTimeout | AuthError::LoginTimeout(_)) => {
                "Sign-in timed out. Please try again."
            }
            Self::Auth(AuthError::UserCancelled) => "Sign-in was cancelled.",
            Self::Auth(_) => "Sign-in failed. Please try again.",
            Self::Api(ApiError::RateLimitExhausted { .. }) => {
                "Too many requests. Please wait a moment."
            }
            Self::Api(ApiError::Status { status: 403, .. }) => {
                "Insufficient permissions for this operation."
            }
            Self::Api(e) if e.requires_sign_in() => "Authentication expired. Sign in again.",
            Self::Api(ApiError::Transport(_) | ApiError::Timeout(_)) => {
                "Network error. Check your connection."
            }
            Self::Api(_) => "Unexpected response from Azure. Please try again.",
            Self::Validation(_) => "Please correct the highlighted input.",
            Self::Batch(e) if e.error.requires_sign_in() => "Authentication expired. Sign in again.",
            Self::Batch(_) => "Some items could not be processed. Check the log.",
        }
    }

    /// Returns true if this error should send the user back to the sign-in screen.
    pub fn requires_sign_in(&self) -> bool {
        match self {
            Self::Auth(e) => e.requires_sign_in(),
            Self::Api(e) => e.requires_sign_in(),
            Self::Batch(e) => e.error.requires_sign_in(),
            _ => false,
        }
    }
}
