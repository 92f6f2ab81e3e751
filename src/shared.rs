pub mod fs_atomic;
pub mod ids;

pub use fs_atomic::atomic_write_file;
pub use ids::random_hex;
