use keyring::Entry;

use super::store::{StoreError, TokenStore};

const SERVICE_NAME: &str = "vica";

/// Keychain account the session token is filed under
const TOKEN_ACCOUNT: &str = "session-token";

/// Session token kept in the OS keychain (Keychain on macOS, Credential
/// Manager on Windows, the kernel keyring on Linux)
pub struct KeychainTokenStore {
    entry: Entry,
}

impl KeychainTokenStore {
    pub fn new() -> Result<Self, StoreError> {
        Ok(Self {
            entry: Entry::new(SERVICE_NAME, TOKEN_ACCOUNT)?,
        })
    }
}

impl TokenStore for KeychainTokenStore {
    fn get(&self) -> Result<Option<String>, StoreError> {
        match self.entry.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, token: &str) -> Result<(), StoreError> {
        self.entry.set_password(token)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
