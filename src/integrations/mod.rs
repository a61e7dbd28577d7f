//! External collaborators: channel providers and the reservation / follow-up store.

pub mod channels {
    pub use crate::channels::*;
}

pub mod db_storage {
    pub use crate::db_storage::*;
}
