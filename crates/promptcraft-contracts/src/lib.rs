pub mod events;
pub mod hints;
pub mod jobs;
pub mod models;
pub mod request;
pub mod results;
pub mod suggestions;
pub mod wire;
