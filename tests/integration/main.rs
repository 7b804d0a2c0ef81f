// Integration test suite for the gateway.
//
// Organized into focused modules by feature area, all sharing the
// common::TestClient for database lifecycle management.

mod common;

mod account_strength;
mod sends;
mod session_lifecycle;
mod settings_profile;
mod subscriptions;
mod v1_api;
mod wallet;
mod webhooks;
