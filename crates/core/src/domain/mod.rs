pub mod agreement;
pub mod product;
pub mod session;
pub mod turn;
