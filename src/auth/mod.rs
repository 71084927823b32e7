pub mod claims;
pub mod middleware;
pub mod reconcile;
pub mod verifier;
