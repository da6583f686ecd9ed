//! HTTP-facing pieces: the OAuth callback router and the bearer token
//! verifier used when this process acts as a resource server.

pub mod callback;
pub mod token_verifier;

pub use callback::router as callback_router;
pub use token_verifier::McpTokenVerifier;
