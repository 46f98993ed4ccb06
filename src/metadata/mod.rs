mod class;
mod field;
mod registry;

pub use class::{ClassMetadata, LayoutSlot};
pub use field::{FieldKind, FieldMapping};
pub use registry::MetadataRegistry;
