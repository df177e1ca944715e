pub mod commands;
pub mod model_file;
pub mod trace_init;
