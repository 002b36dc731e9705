pub mod annotation;

pub use annotation::{AnnotationLight, ClusteredRow, ListingOutput};
