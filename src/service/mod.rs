//! CrudService: generic CRUD using the safe SQL builder.

mod crud;
mod validation;
pub use crud::{CrudService, ListQuery, SortField};
pub use validation::RequestValidator;
