//! Mock auth helpers for HTTP tests.
//!
//! Services behind the gateway receive `x-campus-user-id` + `x-campus-user-role` headers
//! injected by the gateway. In tests, `MockAuth` produces these headers directly
//! so no real gateway is needed.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use uuid::Uuid;

use campus_core::identity::{X_CAMPUS_USER_ID, X_CAMPUS_USER_ROLE};
use campus_domain::user::UserRole;

/// Configurable identity injected into test requests.
pub struct MockAuth {
    pub user_id: Uuid,
    pub user_role: UserRole,
}

impl MockAuth {
    pub fn new(user_id: Uuid, user_role: UserRole) -> Self {
        Self { user_id, user_role }
    }

    pub fn student() -> Self {
        Self::new(Uuid::new_v4(), UserRole::Student)
    }

    pub fn instructor() -> Self {
        Self::new(Uuid::new_v4(), UserRole::Instructor)
    }

    pub fn admin() -> Self {
        Self::new(Uuid::new_v4(), UserRole::Admin)
    }

    /// Return headers as if the gateway injected them.
    pub fn headers(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(
            HeaderName::from_static(X_CAMPUS_USER_ID),
            HeaderValue::from_str(&self.user_id.to_string()).unwrap(),
        );
        map.insert(
            HeaderName::from_static(X_CAMPUS_USER_ROLE),
            HeaderValue::from_str(&self.user_role.as_u8().to_string()).unwrap(),
        );
        map
    }
}
