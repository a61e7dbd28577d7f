// Domain-layer modules and shared errors/models
pub mod insights {
    pub use crate::insights::*;
}

pub mod strategies {
    pub use crate::strategies::*;
}

pub mod dispatch {
    pub use crate::dispatch::*;
}

pub mod content {
    pub use crate::content::*;
}

pub mod followup {
    pub use crate::followup::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
