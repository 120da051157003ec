pub mod config;
pub mod domain;
pub mod errors;
pub mod policy;

pub use domain::agreement::Agreement;
pub use domain::product::{Product, ProductId};
pub use domain::session::{NegotiationSession, SessionId, SessionState};
pub use domain::turn::{Speaker, Turn};
pub use errors::{ApplicationError, DomainError, InterfaceError, BACKEND_RETRY_MESSAGE};
pub use policy::{
    CounterHistory, NegotiationDirective, NegotiationTuning, PolicyEngine,
};
