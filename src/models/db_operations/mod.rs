pub mod comics_db_operations;
pub mod users_db_operations;
