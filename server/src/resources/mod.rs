//! [`crate::resource::Resource`] instances for the simple record types.
//! The grouped records live in [`crate::readings`] and [`crate::deliveries`].

pub mod employees;
pub mod fuels;
pub mod positions;
pub mod roles;
pub mod tanks;
pub mod users;
