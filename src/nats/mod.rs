// NATS transport for the message bus

mod client;

pub use client::{subject_to_topic, topic_to_subject, NatsBus, NatsConfig};
