use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::entities::UserRecord;

/// Body of sign-up and sign-in.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct CredentialsRequest {
    #[validate(email(message = "email is not valid"))]
    pub email: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthSessionResponse {
    /// Send back as `Authorization: Bearer <token>`.
    pub token: String,
    pub user: UserResponse,
}

impl UserRecord {
    pub fn to_response(&self) -> UserResponse {
        UserResponse {
            id: self.id.clone(),
            email: self.email.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn creds(email: &str, password: &str) -> CredentialsRequest {
        CredentialsRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    #[test]
    fn short_password_and_bad_email_are_rejected() {
        assert!(creds("a@example.com", "123456").validate().is_ok());
        assert!(creds("a@example.com", "12345").validate().is_err());
        assert!(creds("not-an-email", "123456").validate().is_err());
    }
}
