pub mod global_variables;
pub mod workspace;
