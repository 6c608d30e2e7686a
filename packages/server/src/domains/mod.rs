// Business-logic domains. Infrastructure (persistence, secrets) lives in `kernel`.

pub mod transfer;
