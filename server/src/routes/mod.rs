pub mod accounts;
pub mod claims;
pub mod delivery;
pub mod health;
pub mod tickets;
