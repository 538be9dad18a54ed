pub mod distance;
pub mod duplicate;
pub mod exif;
pub mod export;
pub mod hash;
pub mod perceptual;
pub mod photo;
pub mod policy;
pub mod review;
pub mod scanner;
pub mod sync;
pub mod union_find;
