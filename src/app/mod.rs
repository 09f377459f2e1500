pub mod assets;
pub mod model;
pub mod server;
