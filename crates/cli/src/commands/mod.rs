pub mod cluster;
pub mod health;
pub mod nodes;
pub mod pods;
