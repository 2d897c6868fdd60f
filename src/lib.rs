// Telemetry model, topics and commands
pub mod telemetry;

// Message bus abstraction and in-process bus
pub mod bus;

// NATS client integration
pub mod nats;

// Entity state cache and metrics
pub mod state;

// Sample store, write throttle and background writer
pub mod store;

// Event fan-out to live subscribers
pub mod hub;

// Inbound message routing
pub mod ingest;

// WebSocket connection handling
pub mod subscription;

// HTTP and WebSocket APIs
pub mod api;

// Simulated robots
pub mod sim;

// Configuration loading
pub mod config;
