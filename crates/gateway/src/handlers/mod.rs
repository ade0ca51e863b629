//! HTTP handlers outside the GraphQL endpoint

pub mod health;
pub mod metrics;
pub mod uploads;
