mod loader;
mod schema;

pub use loader::load;
pub use schema::NodeConfig;
