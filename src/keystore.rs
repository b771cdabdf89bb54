//! `KeyStore` capability (Design Notes §9): abstracts the mobile's keychain/keystore behind
//! `load`/`store`/`erase`. Real keychain integration is an external collaborator (spec §1);
//! this crate only defines the trait and an in-memory double for testing the central driver.

use std::collections::HashMap;

pub trait KeyStore {
    fn load(&self, label: &str) -> Option<Vec<u8>>;
    fn store(&mut self, label: &str, bytes: Vec<u8>);
    fn erase(&mut self, label: &str);
}

#[derive(Default)]
pub struct InMemoryKeyStore {
    entries: HashMap<String, Vec<u8>>,
}

impl KeyStore for InMemoryKeyStore {
    fn load(&self, label: &str) -> Option<Vec<u8>> {
        self.entries.get(label).cloned()
    }

    fn store(&mut self, label: &str, bytes: Vec<u8>) {
        self.entries.insert(label.to_string(), bytes);
    }

    fn erase(&mut self, label: &str) {
        self.entries.remove(label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_load_round_trips() {
        let mut ks = InMemoryKeyStore::default();
        ks.store("device-key", vec![1, 2, 3]);
        assert_eq!(ks.load("device-key"), Some(vec![1, 2, 3]));
    }

    #[test]
    fn erase_removes_entry() {
        let mut ks = InMemoryKeyStore::default();
        ks.store("device-key", vec![1, 2, 3]);
        ks.erase("device-key");
        assert_eq!(ks.load("device-key"), None);
    }
}
