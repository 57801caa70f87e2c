mod condition;
mod pg_database;
mod pg_instance;
mod pg_user;
mod property;

pub use condition::*;
pub use pg_database::*;
pub use pg_instance::*;
pub use pg_user::*;
pub use property::*;
