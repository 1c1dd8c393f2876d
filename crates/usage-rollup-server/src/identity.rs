use async_trait::async_trait;
use secrecy::SecretString;
use usage_rollup_common::security::DeviceTokenSigner;
use usage_rollup_common::{AuthError, Result, UserId};

/// Resolves a device bearer credential to the user it belongs to.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> std::result::Result<UserId, AuthError>;
}

/// Verifies `<user_id>.<hex hmac-sha256>` tokens signed with the server's key.
#[derive(Debug, Clone)]
pub struct HmacTokenVerifier {
    signer: DeviceTokenSigner,
}

impl HmacTokenVerifier {
    pub fn new(signing_key: &SecretString) -> Result<Self> {
        Ok(Self { signer: DeviceTokenSigner::new(signing_key)? })
    }
}

#[async_trait]
impl IdentityVerifier for HmacTokenVerifier {
    async fn verify(&self, credential: &str) -> std::result::Result<UserId, AuthError> {
        self.signer.verify(credential)
    }
}

/// Mint a device token for `user`.
pub fn issue_device_token(signing_key: &SecretString, user: &UserId) -> Result<String> {
    Ok(DeviceTokenSigner::new(signing_key)?.issue(user))
}
