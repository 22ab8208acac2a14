pub mod table;
pub mod worker;
