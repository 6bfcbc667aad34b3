//! C4: AVLLoader — normalizes agency-specific AVL exports into the
//! canonical AVL stop-event schema.

pub mod loader;
pub mod model;

pub use loader::load;
pub use model::AvlStopEvent;
