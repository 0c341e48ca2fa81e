// crates/tabula-server/src/sql/mod.rs
// SQL safety gate, SQL-to-operation translation and the in-memory scan fallback

pub(crate) mod parse;
pub mod scan;
pub mod translator;
pub mod validator;

pub use translator::{Operation, execute, translate};
pub use validator::{ValidatedSql, validate};
