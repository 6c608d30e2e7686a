// Kernel - core infrastructure (durable job/item persistence, secrets).
//
// IMPORTANT: Kernel is for INFRASTRUCTURE only, not business logic.
// Business logic (the worker, orchestrator, template rendering, duplicate
// detection) lives in `domains::transfer`.

pub mod jobs;
pub mod secrets;

pub use secrets::SecretStore;
