/// Entities, the `LedgerStore` trait and its Postgres / in-memory backends.
pub mod db;

/// The transaction engine: intent validation, atomic balance application,
/// identifier generation and the typed error taxonomy.
pub mod engine;

/// Thin HTTP surface over the engine.
pub mod routes;
