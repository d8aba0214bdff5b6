pub mod gpu_context;
pub mod gpu_program;
pub mod staged_buffer;
