// Clients for the hosted backend-as-a-service.

pub mod backend;

pub use backend::BackendClient;
