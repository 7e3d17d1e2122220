//! User and session models sourced from the identity provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Signed-in user as known to the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub email: String,
    /// Display name from provider metadata; empty when the provider has none.
    #[serde(default)]
    pub name: String,
}

/// Active session issued by the identity provider.
///
/// Never serialized back to API clients as a whole; routes return
/// [`SessionResponse`] instead.
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub user: User,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| exp <= Utc::now())
    }
}

/// Session DTO returned by the login and signup endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub user: User,
}

impl From<Session> for SessionResponse {
    fn from(s: Session) -> Self {
        Self {
            access_token: s.access_token,
            refresh_token: s.refresh_token,
            token_type: "Bearer".to_string(),
            expires_at: s.expires_at,
            user: s.user,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Credentials {
    #[validate(email(message = "Email address is invalid"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email(message = "Email address is invalid"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Email address is invalid"))]
    pub email: String,
}

/// New password, sent with the recovery token as bearer.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user() -> User {
        User {
            id: "u-1".to_string(),
            email: "dev@example.com".to_string(),
            name: "Dev".to_string(),
        }
    }

    #[test]
    fn session_expiry() {
        let mut session = Session {
            access_token: "t".to_string(),
            refresh_token: None,
            expires_at: Some(Utc::now() - Duration::seconds(5)),
            user: user(),
        };
        assert!(session.is_expired());

        session.expires_at = Some(Utc::now() + Duration::hours(1));
        assert!(!session.is_expired());

        session.expires_at = None;
        assert!(!session.is_expired());
    }

    #[test]
    fn user_name_defaults_to_empty() {
        let u: User = serde_json::from_str(r#"{"id":"1","email":"a@b.co"}"#).unwrap();
        assert_eq!(u.name, "");
    }

    #[test]
    fn short_signup_password_rejected() {
        let req = SignupRequest {
            email: "dev@example.com".to_string(),
            password: "123".to_string(),
            name: String::new(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn session_response_carries_bearer_type() {
        let response = SessionResponse::from(Session {
            access_token: "abc".to_string(),
            refresh_token: Some("r".to_string()),
            expires_at: None,
            user: user(),
        });
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["token_type"], "Bearer");
        assert_eq!(json["user"]["email"], "dev@example.com");
    }
}
