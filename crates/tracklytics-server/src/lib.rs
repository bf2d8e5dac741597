pub mod app;
pub mod classify;
pub mod error;
pub mod routes;
pub mod state;
