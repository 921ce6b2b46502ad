pub mod model;
pub mod repository;

pub use model::{TenantRecord, TenantStatus};
pub use repository::{PgTenantsRepository, TenantsRepository};

#[cfg(test)]
pub use repository::MockTenantsRepository;
