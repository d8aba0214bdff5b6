pub mod accelerator_backend;
pub mod backend_factory;
pub mod sequential_backend;
