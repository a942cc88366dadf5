// Content identity and path normalization
// The two leaf components every inventory is built from

pub mod identity;
pub mod path_utils;

// Re-export commonly used types for convenience
pub use identity::{
    compute, compute_bytes, compute_file, ContentIdentity, HashAlgorithm, Hasher, IdentityScheme,
};
pub use path_utils::{key_to_relative, local_relative, normalize_object_root, to_relative, to_remote_key};
