mod store_config;
pub use store_config::{normalize_prefix, split_bucket_prefix, split_fs_root};

mod bucket_store;
pub use bucket_store::BucketStore;

#[cfg(test)]
mod bucket_store_test;
