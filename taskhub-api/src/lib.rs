//! # taskhub-api
//!
//! Shared API types for the taskhub service.
//! This crate is designed to be WASM-compatible and can be used in both
//! backend (Rust) and frontend (WASM/TypeScript via wasm-bindgen) applications.
//!
//! ## Features
//!
//! - Request DTOs (RegisterRequest, LoginRequest, etc.)
//! - Response DTOs (UserResponse, AuthResponse, etc.)
//! - Error response format (ErrorResponse)
//! - Client-side session logic (`client`): single-flight refresh coordination
//!
//! ## Example
//!
//! ```rust
//! use taskhub_api::LoginRequest;
//!
//! let request = LoginRequest {
//!     email: "user@example.com".to_string(),
//!     password: "password123".to_string(),
//! };
//! ```

pub mod client;
pub mod error;
pub mod requests;
pub mod responses;

// Re-exports for convenient access
pub use error::ErrorResponse;
pub use requests::*;
pub use responses::*;
