pub mod atomic_file;
pub mod clock;
pub mod persistence;
