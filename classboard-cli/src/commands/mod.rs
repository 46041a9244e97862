pub mod courses;
pub mod dedupe;
pub mod init;
pub mod status;
pub mod sync;
pub mod validate;
pub mod wipe;
