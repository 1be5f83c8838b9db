// src/services/mod.rs
//
// Shared services module containing business logic services
// that can be used across different domain modules

pub mod nonce;
pub mod oauth;

// Re-export commonly used types for convenience
pub use nonce::{MemoryTtlStore, NonceStore, TtlStore};
pub use oauth::{OAuthError, OAuthService, Provider, ProviderConfig, ProviderProfile};
