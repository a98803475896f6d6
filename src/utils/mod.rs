//! Utility helpers for cookie jars and XML extraction.

pub mod cookies;
pub mod xml;

// Re-export the commonly used type at module level
pub use cookies::CookieMap;
