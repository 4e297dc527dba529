//! Self-signed token issuance and the on-disk credential vault.

pub mod claims;
pub mod issuer;
pub mod vault;

pub use claims::Claims;
pub use issuer::TokenIssuer;
pub use vault::{StoredTokenRecord, TokenVault};
