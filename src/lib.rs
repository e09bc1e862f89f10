pub mod config;
pub mod db;
pub mod output;
pub mod select;
