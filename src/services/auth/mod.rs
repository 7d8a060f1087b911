pub mod factory;
pub mod principal;
pub mod verifier;

pub use factory::build_verifier;
pub use principal::{Principal, normalize_role};
pub use verifier::{CredentialError, CredentialVerifier, KeyError, KeyMaterial, VerifierConfig};
