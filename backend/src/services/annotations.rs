use std::collections::HashMap;

/// Read-only view of caller-maintained tip annotations.
pub trait AnnotationLookup: Send + Sync {
    /// Display name registered for a sender
    fn display_name(&self, address: &str) -> Option<String>;

    /// Message attached to one tip
    fn message(&self, address: &str, transaction_hash: &str) -> Option<String>;
}

/// Annotation snapshot held in memory. Keys are stored lower-cased.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAnnotations {
    names: HashMap<String, String>,
    messages: HashMap<(String, String), String>,
}

impl InMemoryAnnotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_name(&mut self, address: &str, name: impl Into<String>) {
        self.names.insert(address.to_lowercase(), name.into());
    }

    pub fn insert_message(&mut self, address: &str, transaction_hash: &str, message: impl Into<String>) {
        self.messages.insert(
            (address.to_lowercase(), transaction_hash.to_lowercase()),
            message.into(),
        );
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

impl AnnotationLookup for InMemoryAnnotations {
    fn display_name(&self, address: &str) -> Option<String> {
        self.names.get(&address.to_lowercase()).cloned()
    }

    fn message(&self, address: &str, transaction_hash: &str) -> Option<String> {
        self.messages
            .get(&(address.to_lowercase(), transaction_hash.to_lowercase()))
            .cloned()
    }
}
