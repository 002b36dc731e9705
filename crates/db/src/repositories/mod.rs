pub mod annotation_listing_repo;
pub mod kmeans_repo;
pub mod lookup_repo;
pub mod user_annotation_repo;

pub use annotation_listing_repo::AnnotationListingRepo;
pub use kmeans_repo::KmeansRepo;
pub use lookup_repo::LookupRepo;
pub use user_annotation_repo::UserAnnotationRepo;
