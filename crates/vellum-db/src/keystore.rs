use vellum_crypto::{KeyStore, StoreError, StoredKeyPair};
use vellum_types::IdentityId;
use zeroize::Zeroizing;

use crate::Database;

impl KeyStore for Database {
    fn put(&self, id: IdentityId, keys: StoredKeyPair) -> Result<(), StoreError> {
        let private_pem = keys.private_pem.as_ref().map(|pem| pem.as_str());
        if !self.insert_identity(id, &keys.public_pem, private_pem)? {
            return Err(StoreError::AlreadyExists(id));
        }
        Ok(())
    }

    fn get(&self, id: IdentityId) -> Result<Option<StoredKeyPair>, StoreError> {
        Ok(self.get_identity(id)?.map(|row| StoredKeyPair {
            public_pem: row.public_key,
            private_pem: row.private_key.map(Zeroizing::new),
        }))
    }
}
