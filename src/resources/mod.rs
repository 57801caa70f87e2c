pub mod common;
pub mod connection_string;
pub mod pg_api;
pub mod postgres_client;
pub mod secret;
pub mod sql;
pub mod store;

pub use common::{API_GROUP, FIELD_MANAGER, owner_reference, user_labels};
pub use connection_string::{ConnectionString, SslMode};
pub use pg_api::PostgresApiFactory;
pub use store::{KubeStore, ObjectStore, ResourceStore};
