//! Authentication: bearer token validation for the relay endpoints

pub mod provider;
pub mod token;

// Re-export main components
pub use provider::{AuthProvider, AuthenticatedUser, JwtAuthProvider, SharedAuthProvider};
pub use token::{extract_bearer_token, Claims, TokenManager};
