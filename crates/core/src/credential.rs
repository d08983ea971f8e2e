//! Access credentials as seen by the polling core.
//!
//! The core never acquires or persists tokens. It reads the current access
//! token through a [`CredentialHandle`] and, when a backend rejects it, asks
//! the owner to refresh via the callback threaded into the handle. The owner
//! publishes the outcome through the matching [`CredentialStore`].

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
}

impl Credential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }

    pub fn has_valid_token(&self) -> bool {
        !self.access_token.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("has_valid_token", &self.has_valid_token())
            .finish()
    }
}

pub type RefreshCallback = Arc<dyn Fn() + Send + Sync>;

/// Writer side, owned by the session layer.
#[derive(Debug)]
pub struct CredentialStore {
    tx: watch::Sender<Credential>,
}

impl CredentialStore {
    pub fn new(initial: Credential) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn set_token(&self, access_token: impl Into<String>) {
        let next = Credential::new(access_token);
        self.tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    pub fn clear(&self) {
        self.set_token(String::new());
    }

    pub fn current(&self) -> Credential {
        self.tx.borrow().clone()
    }

    pub fn handle(&self, refresh: RefreshCallback) -> CredentialHandle {
        CredentialHandle {
            rx: self.tx.subscribe(),
            refresh,
        }
    }
}

/// Reader side, handed to a provider adapter.
#[derive(Clone)]
pub struct CredentialHandle {
    rx: watch::Receiver<Credential>,
    refresh: RefreshCallback,
}

impl CredentialHandle {
    /// `None` when no usable token is present.
    pub fn access_token(&self) -> Option<String> {
        let current = self.rx.borrow();
        if current.has_valid_token() {
            Some(current.access_token.clone())
        } else {
            None
        }
    }

    pub fn is_available(&self) -> bool {
        self.rx.borrow().has_valid_token()
    }

    pub fn request_refresh(&self) {
        (self.refresh)();
    }

    pub fn subscribe(&self) -> watch::Receiver<Credential> {
        self.rx.clone()
    }
}

impl fmt::Debug for CredentialHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialHandle")
            .field("available", &self.is_available())
            .finish()
    }
}
