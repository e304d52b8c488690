//! Usable/expired bookkeeping for the credentials of one task

use std::collections::HashSet;

use crate::graph::{Credential, Identity};

/// A validated credential and the account behind it
#[derive(Debug, Clone)]
pub struct PoolMember {
    /// 1-based position in the submitted list
    pub position: usize,
    pub credential: Credential,
    pub identity: Identity,
}

/// Validated credentials in validation order plus the set marked expired.
///
/// Expiry is permanent for the lifetime of the pool.
#[derive(Debug, Clone, Default)]
pub struct CredentialPool {
    members: Vec<PoolMember>,
    expired: HashSet<Credential>,
}

impl CredentialPool {
    pub fn new(members: Vec<PoolMember>) -> Self {
        Self {
            members,
            expired: HashSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn usable_count(&self) -> usize {
        self.members.len() - self.expired.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.usable_count() == 0
    }

    pub fn is_expired(&self, credential: &Credential) -> bool {
        self.expired.contains(credential)
    }

    /// Mark `credential` expired. Returns `true` only the first time for a member.
    pub fn mark_expired(&mut self, credential: &Credential) -> bool {
        if !self.members.iter().any(|m| &m.credential == credential) {
            return false;
        }
        self.expired.insert(credential.clone())
    }

    /// Non-expired credentials in pool order, computed fresh on every call
    pub fn live_view(&self) -> Vec<Credential> {
        self.members
            .iter()
            .filter(|m| !self.expired.contains(&m.credential))
            .map(|m| m.credential.clone())
            .collect()
    }
}
