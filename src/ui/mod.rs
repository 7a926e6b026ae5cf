pub mod contents;
pub mod router;
pub mod shell;
