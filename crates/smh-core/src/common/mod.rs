pub mod constants;
pub mod defaults;
pub mod elements;
pub mod solar;

pub use defaults::{DefaultsError, SessionDefaults, load_session_defaults};
pub use elements::{Species, atomic_number_for_symbol, element_symbol};
pub use solar::solar_abundance;
