use hmac::{Hmac, Mac};
use rand::{distributions::Alphanumeric, Rng};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{AuthError, Error};
use crate::types::UserId;

type HmacSha256 = Hmac<Sha256>;

/// Compare an operator-supplied secret against the configured one in constant time.
///
/// An unset expected secret never matches, so an unconfigured deployment
/// rejects every manual trigger.
pub fn admin_secret_matches(expected: Option<&SecretString>, provided: Option<&str>) -> bool {
    let (Some(expected), Some(provided)) = (expected, provided) else {
        return false;
    };

    let expected = expected.expose_secret().as_bytes();
    let provided = provided.as_bytes();

    if expected.is_empty() || expected.len() != provided.len() {
        return false;
    }

    expected.ct_eq(provided).into()
}

/// Generate a random 64 character secret suitable for the admin trigger or token signing key.
pub fn generate_secret() -> SecretString {
    let secret: String =
        rand::thread_rng().sample_iter(&Alphanumeric).take(64).map(char::from).collect();
    SecretString::from(secret)
}

/// Issues and verifies device bearer tokens of the form `<user_id>.<hex hmac-sha256>`.
#[derive(Clone)]
pub struct DeviceTokenSigner {
    mac: HmacSha256,
}

impl DeviceTokenSigner {
    pub fn new(signing_key: &SecretString) -> Result<Self, Error> {
        let key = signing_key.expose_secret().as_bytes();
        if key.is_empty() {
            return Err(Error::Config("token signing key is empty".to_string()));
        }

        let mac = HmacSha256::new_from_slice(key)
            .map_err(|e| Error::Config(format!("invalid token signing key: {}", e)))?;
        Ok(Self { mac })
    }

    pub fn issue(&self, user: &UserId) -> String {
        let mut mac = self.mac.clone();
        mac.update(user.as_str().as_bytes());
        format!("{}.{}", user, hex::encode(mac.finalize().into_bytes()))
    }

    pub fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let (user, signature) = token.rsplit_once('.').ok_or(AuthError::InvalidCredential)?;
        if user.is_empty() {
            return Err(AuthError::InvalidCredential);
        }

        let signature = hex::decode(signature).map_err(|_| AuthError::InvalidCredential)?;

        let mut mac = self.mac.clone();
        mac.update(user.as_bytes());
        mac.verify_slice(&signature).map_err(|_| AuthError::InvalidCredential)?;

        Ok(UserId::from(user))
    }
}

impl std::fmt::Debug for DeviceTokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceTokenSigner").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    #[test]
    fn test_admin_secret_matching() {
        let expected = secret("s3cret-value");

        assert!(admin_secret_matches(Some(&expected), Some("s3cret-value")));
        assert!(!admin_secret_matches(Some(&expected), Some("s3cret-valuf")));
        assert!(!admin_secret_matches(Some(&expected), Some("short")));
        assert!(!admin_secret_matches(Some(&expected), None));
        assert!(!admin_secret_matches(None, Some("s3cret-value")));
        assert!(!admin_secret_matches(Some(&secret("")), Some("")));
    }

    #[test]
    fn test_generated_secrets_are_distinct() {
        let a = generate_secret();
        let b = generate_secret();

        assert_eq!(a.expose_secret().len(), 64);
        assert_ne!(a.expose_secret(), b.expose_secret());
    }

    #[test]
    fn test_device_token_roundtrip() {
        let signer = DeviceTokenSigner::new(&secret("signing-key")).unwrap();
        let user = UserId::from("user.with.dots");

        let token = signer.issue(&user);
        assert!(token.starts_with("user.with.dots."));
        assert_eq!(signer.verify(&token), Ok(user));
    }

    #[test]
    fn test_device_token_rejections() {
        let signer = DeviceTokenSigner::new(&secret("signing-key")).unwrap();
        let other = DeviceTokenSigner::new(&secret("other-key")).unwrap();
        let token = other.issue(&UserId::from("alice"));

        assert_eq!(signer.verify(&token), Err(AuthError::InvalidCredential));
        assert_eq!(signer.verify(""), Err(AuthError::MissingCredential));
        assert_eq!(signer.verify("no-signature"), Err(AuthError::InvalidCredential));
        assert_eq!(signer.verify(".abcd"), Err(AuthError::InvalidCredential));
        assert_eq!(signer.verify("alice.not-hex"), Err(AuthError::InvalidCredential));

        let forged = signer.issue(&UserId::from("alice")).replace("alice", "mallory");
        assert_eq!(signer.verify(&forged), Err(AuthError::InvalidCredential));
    }

    #[test]
    fn test_empty_signing_key_is_rejected() {
        assert!(matches!(DeviceTokenSigner::new(&secret("")), Err(Error::Config(_))));
    }
}
