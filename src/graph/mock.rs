//! Scripted in-process Graph API for tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::types::{Credential, DeliveryOutcome, Identity, ValidationFailure};
use super::{CredentialValidator, DeliveryClient};

/// How deliveries with a given token behave
#[derive(Debug, Clone)]
pub enum Behaviour {
    Deliver,
    Expire,
    Deny,
    Fail(String),
    /// Play outcomes in order, then deliver
    Sequence(Vec<DeliveryOutcome>),
    /// Panic inside the delivery call
    Panic,
}

/// One recorded delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryCall {
    pub token: String,
    pub target_id: String,
    pub message: String,
}

/// Fake implementing [`CredentialValidator`] and [`DeliveryClient`].
///
/// Tokens not registered with [`ScriptedGraph::valid`] fail validation; tokens
/// without a [`Behaviour`] deliver successfully.
#[derive(Debug, Default)]
pub struct ScriptedGraph {
    identities: HashMap<String, Identity>,
    rejections: HashMap<String, String>,
    behaviours: HashMap<String, Behaviour>,
    sequences: Mutex<HashMap<String, VecDeque<DeliveryOutcome>>>,
    calls: Mutex<Vec<DeliveryCall>>,
    validations: AtomicUsize,
    next_comment: AtomicUsize,
}

impl ScriptedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token that validates as `name`
    pub fn valid(mut self, token: &str, name: &str) -> Self {
        self.identities.insert(
            token.to_string(),
            Identity {
                id: format!("id-{token}"),
                name: name.to_string(),
            },
        );
        self
    }

    /// Register a token that fails validation with `reason`
    pub fn invalid(mut self, token: &str, reason: &str) -> Self {
        self.rejections.insert(token.to_string(), reason.to_string());
        self
    }

    pub fn on_deliver(mut self, token: &str, behaviour: Behaviour) -> Self {
        if let Behaviour::Sequence(outcomes) = &behaviour {
            self.sequences
                .get_mut()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .insert(token.to_string(), outcomes.iter().cloned().collect());
        }
        self.behaviours.insert(token.to_string(), behaviour);
        self
    }

    /// Every delivery attempt so far, in call order
    pub fn delivery_calls(&self) -> Vec<DeliveryCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Delivery attempts made with `token`
    pub fn attempts_with(&self, token: &str) -> usize {
        self.delivery_calls()
            .iter()
            .filter(|call| call.token == token)
            .count()
    }

    pub fn validation_count(&self) -> usize {
        self.validations.load(Ordering::SeqCst)
    }

    fn delivered(&self) -> DeliveryOutcome {
        let n = self.next_comment.fetch_add(1, Ordering::SeqCst);
        DeliveryOutcome::Delivered {
            comment_id: format!("comment-{n}"),
        }
    }
}

#[async_trait]
impl CredentialValidator for ScriptedGraph {
    async fn validate(&self, credential: &Credential) -> Result<Identity, ValidationFailure> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        let token = credential.expose();

        if let Some(identity) = self.identities.get(token) {
            return Ok(identity.clone());
        }
        let reason = self
            .rejections
            .get(token)
            .cloned()
            .unwrap_or_else(|| "Invalid OAuth access token (code 190)".to_string());
        Err(ValidationFailure::new(reason))
    }
}

#[async_trait]
impl DeliveryClient for ScriptedGraph {
    async fn deliver(&self, credential: &Credential, target_id: &str, message: &str) -> DeliveryOutcome {
        let token = credential.expose();
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(DeliveryCall {
                token: token.to_string(),
                target_id: target_id.to_string(),
                message: message.to_string(),
            });

        match self.behaviours.get(token) {
            None | Some(Behaviour::Deliver) => self.delivered(),
            Some(Behaviour::Expire) => DeliveryOutcome::CredentialExpired {
                reason: "Error validating access token: Session has expired (code 190)".to_string(),
            },
            Some(Behaviour::Deny) => DeliveryOutcome::PermissionDenied {
                reason: "(#200) Permissions error (code 200)".to_string(),
            },
            Some(Behaviour::Fail(reason)) => DeliveryOutcome::other(reason.clone()),
            Some(Behaviour::Sequence(_)) => {
                let next = self
                    .sequences
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .get_mut(token)
                    .and_then(VecDeque::pop_front);
                next.unwrap_or_else(|| self.delivered())
            }
            Some(Behaviour::Panic) => panic!("scripted delivery panic"),
        }
    }
}
