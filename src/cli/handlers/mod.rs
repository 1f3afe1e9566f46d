pub mod auth;
pub mod graveyard;
pub mod profile;
pub mod recommendations;
pub mod rotation;
pub mod shoes;
