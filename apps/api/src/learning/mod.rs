pub mod handlers;
pub mod path_assembler;
pub mod progress;
