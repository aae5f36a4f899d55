pub mod subscription;
pub mod user;
pub mod video;
