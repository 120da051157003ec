pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{seed_demo_products, SeedError, SeedResult};
pub use repositories::{
    DealLedger, InMemoryNegotiationStore, ProductStore, RepositoryError, SessionStore,
    SessionSummary, SqlDealLedger, SqlProductStore, SqlSessionStore, SqlTranscriptStore,
    TranscriptStore,
};
