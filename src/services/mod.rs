pub mod ads;
pub mod moderation;
pub mod points;
pub mod suggestions;
pub mod tickets;
