pub mod drug;

pub use drug::{Drug, DrugName, InteractionField, InteractionParseError, NO_EQUIVALENCE_CODE};
