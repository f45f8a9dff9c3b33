pub mod snowflake;
pub mod text;
