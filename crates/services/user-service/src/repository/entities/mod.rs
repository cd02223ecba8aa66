//! SeaORM entities.

pub mod follow;
pub mod user;
