pub mod db;
pub mod models;
pub mod nutrition;
pub mod remote;
pub mod store;
pub mod suggest;
pub mod sync;
