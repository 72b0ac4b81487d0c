pub mod guard;
pub mod password;
pub mod session;

pub use guard::{owns_resource, require_owner, require_self};
pub use session::{Principal, SessionKeys};
