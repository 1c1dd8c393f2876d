use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use usage_rollup_common::security::{generate_secret, DeviceTokenSigner};
use usage_rollup_common::UserId;

pub fn mint(user: &str, key: String) -> Result<String> {
    let user = user.trim();
    if user.is_empty() || user.contains('.') {
        anyhow::bail!("User id must be non-empty and must not contain '.'");
    }

    let signer = DeviceTokenSigner::new(&SecretString::from(key)).context("Invalid signing key")?;
    Ok(signer.issue(&UserId::from(user)))
}

pub fn issue(user: &str, key: String) -> Result<()> {
    println!("{}", mint(user, key)?);
    Ok(())
}

pub fn secret() {
    println!("{}", generate_secret().expose_secret());
}
