pub mod schema;

pub use schema::{build_http_client, env_optional, env_required, Config};
