//! Chat-layer errors and classification.

use std::error::Error;
use std::fmt::{Display, Formatter};

use tprovider::{ProviderError, ProviderErrorKind};
use ttooling::ToolError;
use ttree::{StoreError, StoreErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatErrorKind {
    InvalidRequest,
    Configuration,
    NotFound,
    Provider,
    Store,
    Tooling,
    Cancelled,
}

/// Where in a turn the failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatErrorPhase {
    Configuration,
    RequestBuild,
    Provider,
    Tooling,
    Storage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatError {
    pub kind: ChatErrorKind,
    pub phase: Option<ChatErrorPhase>,
    pub message: String,
}

impl ChatError {
    pub fn new(kind: ChatErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            phase: None,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::InvalidRequest, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::Configuration, message).with_phase(ChatErrorPhase::Configuration)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::NotFound, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::Provider, message).with_phase(ChatErrorPhase::Provider)
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::Store, message).with_phase(ChatErrorPhase::Storage)
    }

    pub fn tooling(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::Tooling, message).with_phase(ChatErrorPhase::Tooling)
    }

    pub fn cancelled() -> Self {
        Self::new(ChatErrorKind::Cancelled, "turn was cancelled")
    }

    pub fn with_phase(mut self, phase: ChatErrorPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ChatErrorKind::Cancelled
    }

    /// Text stored in the conversation when a turn fails.
    pub fn to_note(&self) -> String {
        format!("Error: {}", self.message)
    }
}

impl Display for ChatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.phase {
            Some(phase) => write!(f, "{:?} [{:?}]: {}", self.kind, phase, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl Error for ChatError {}

impl From<ProviderError> for ChatError {
    fn from(value: ProviderError) -> Self {
        match value.kind {
            ProviderErrorKind::Cancelled => ChatError::cancelled(),
            ProviderErrorKind::InvalidRequest => {
                ChatError::provider(value.message).with_phase(ChatErrorPhase::RequestBuild)
            }
            _ => ChatError::provider(value.to_string()),
        }
    }
}

impl From<StoreError> for ChatError {
    fn from(value: StoreError) -> Self {
        match value.kind {
            StoreErrorKind::NotFound => {
                ChatError::not_found(value.message).with_phase(ChatErrorPhase::Storage)
            }
            StoreErrorKind::InvalidRequest => {
                ChatError::invalid_request(value.message).with_phase(ChatErrorPhase::Storage)
            }
            _ => ChatError::store(value.to_string()),
        }
    }
}

impl From<ToolError> for ChatError {
    fn from(value: ToolError) -> Self {
        ChatError::tooling(value.to_string())
    }
}
