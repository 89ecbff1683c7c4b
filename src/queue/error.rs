//! Error types for the message queue

use thiserror::Error;

/// Message queue error
#[derive(Debug, Error)]
pub enum QueueError {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Stream or consumer setup error
    #[error("JetStream error: {0}")]
    JetStream(String),

    /// Publish error
    #[error("Publish error: {0}")]
    Publish(String),

    /// Receive error
    #[error("Receive error: {0}")]
    Receive(String),

    /// Acknowledgement error
    #[error("Acknowledgement error: {0}")]
    Ack(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Queue closed
    #[error("Queue is closed")]
    Closed,
}
