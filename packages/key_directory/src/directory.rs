use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DirectoryError, Field};

/// A registered username and its public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub public_key: String,
}

/// In-memory username -> public key mapping.
///
/// Not internally synchronized: callers own it behind whatever lock
/// serializes their requests.
#[derive(Debug, Default, Clone)]
pub struct Directory {
    keys: BTreeMap<String, String>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `username` with `public_key`.
    ///
    /// Both values are stored exactly as given; the blank check trims only
    /// for validation. An existing username is never overwritten.
    pub fn register(&mut self, username: &str, public_key: &str) -> Result<(), DirectoryError> {
        if username.trim().is_empty() {
            return Err(DirectoryError::InvalidInput {
                field: Field::Username,
            });
        }
        if public_key.trim().is_empty() {
            return Err(DirectoryError::InvalidInput {
                field: Field::PublicKey,
            });
        }
        if self.keys.contains_key(username) {
            return Err(DirectoryError::AlreadyExists {
                username: username.to_string(),
            });
        }

        self.keys
            .insert(username.to_string(), public_key.to_string());
        Ok(())
    }

    pub fn lookup(&self, username: &str) -> Result<&str, DirectoryError> {
        self.keys
            .get(username)
            .map(String::as_str)
            .ok_or_else(|| DirectoryError::NotFound {
                username: username.to_string(),
            })
    }

    pub fn exists(&self, username: &str) -> bool {
        self.keys.contains_key(username)
    }

    /// All registered usernames, in lexicographic order.
    pub fn list(&self) -> Vec<String> {
        self.keys.keys().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_lookup() {
        let mut dir = Directory::new();
        dir.register("alice", "PUBKEY1").unwrap();

        assert!(dir.exists("alice"));
        assert_eq!(dir.lookup("alice").unwrap(), "PUBKEY1");
        assert_eq!(dir.count(), 1);
    }

    #[test]
    fn duplicate_registration_keeps_first_key() {
        let mut dir = Directory::new();
        dir.register("alice", "PUBKEY1").unwrap();

        let err = dir.register("alice", "PUBKEY2").unwrap_err();
        assert_eq!(
            err,
            DirectoryError::AlreadyExists {
                username: "alice".into()
            }
        );
        assert_eq!(dir.lookup("alice").unwrap(), "PUBKEY1");
        assert_eq!(dir.count(), 1);
    }

    #[test]
    fn blank_username_rejected() {
        let mut dir = Directory::new();
        for name in ["", "   ", "\t\n"] {
            let err = dir.register(name, "x").unwrap_err();
            assert_eq!(
                err,
                DirectoryError::InvalidInput {
                    field: Field::Username
                }
            );
        }
        assert_eq!(dir.count(), 0);
    }

    #[test]
    fn blank_public_key_rejected() {
        let mut dir = Directory::new();
        let err = dir.register("alice", "  ").unwrap_err();
        assert_eq!(
            err,
            DirectoryError::InvalidInput {
                field: Field::PublicKey
            }
        );
        assert!(!dir.exists("alice"));
    }

    #[test]
    fn username_checked_before_public_key() {
        let mut dir = Directory::new();
        let err = dir.register("", "").unwrap_err();
        assert_eq!(
            err,
            DirectoryError::InvalidInput {
                field: Field::Username
            }
        );
    }

    #[test]
    fn lookup_unknown_user() {
        let dir = Directory::new();
        let err = dir.lookup("bob").unwrap_err();
        assert_eq!(
            err,
            DirectoryError::NotFound {
                username: "bob".into()
            }
        );
        assert!(!dir.exists("bob"));
    }

    #[test]
    fn values_stored_verbatim() {
        let mut dir = Directory::new();
        dir.register(" padded ", "-----BEGIN KEY-----\nabc\n").unwrap();

        assert!(dir.exists(" padded "));
        assert!(!dir.exists("padded"));
        assert_eq!(dir.lookup(" padded ").unwrap(), "-----BEGIN KEY-----\nabc\n");
    }

    #[test]
    fn list_is_sorted() {
        let mut dir = Directory::new();
        dir.register("carol", "k3").unwrap();
        dir.register("alice", "k1").unwrap();
        dir.register("bob", "k2").unwrap();

        assert_eq!(dir.list(), vec!["alice", "bob", "carol"]);
    }
}
