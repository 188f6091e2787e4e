//! Forwards resolved API calls onto the right worker process and inlines QR
//! login images.

pub mod qr_interceptor;
pub mod reverse_proxy;

pub use qr_interceptor::intercept_qr_login;
pub use reverse_proxy::{ProxiedResponse, ReverseProxy};
