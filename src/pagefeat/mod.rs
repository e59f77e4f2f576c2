//! pagefeat - раскладка reserved footer по именованным фичам.
//!
//! Подмодули:
//! - builtin.rs  - каталог built-in фич (encryption_tags, extended_checksums).
//! - registry.rs - FeatureRegistry: add/lookup/optimize, page-level lookup.
//! - persist.rs  - текстовый формат, persist/load.
//! - cluster.rs  - расположение раскладок в каталоге кластера.
//!
//! Раскладка фиксируется один раз на кластер; после persist/load набор read-only для
//! новых built-in и может быть разделён между потоками через Arc без синхронизации.

pub mod builtin;
pub mod registry;
pub mod persist;
pub mod cluster;

pub use builtin::BuiltinFeature;
pub use registry::{validate_feature_name, FeatureDesc, FeatureRegistry};
pub use persist::render_layout;
pub use cluster::{
    create_cluster_layout, layout_dir, layout_path, list_cluster_layouts, open_cluster_layout,
};
