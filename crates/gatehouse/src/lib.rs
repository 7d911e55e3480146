// gatehouse: protocol-level authentication request handler.
//
// Wires together the cookie codec, sealed token codec, CSRF guard, OAuth
// checks engine, authorization-code flow driver, session manager, and the
// request router. Transport adapters convert their native request type to
// `GenericRequest`, call `handle_auth_request`, and convert back.

pub mod checks;
pub mod context;
pub mod cookies;
pub mod crypto;
pub mod handler;
pub mod init;
pub mod oauth;
pub mod providers;
pub mod routes;
pub mod session;
pub mod storage;

pub use context::AuthContext;
pub use handler::{handle_auth_request, GenericRequest, GenericResponse};
pub use init::init;

pub use gatehouse_core::adapter::{
    AdapterAccount, AdapterError, AdapterResult, AdapterSession, AdapterUser, FullAdapter,
    PartialAdapter, Storage, VerificationToken,
};
pub use gatehouse_core::{AuthError, AuthLogger, AuthOptions, ErrorPageParam, Result};
