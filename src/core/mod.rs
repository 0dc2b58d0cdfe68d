pub mod burst;
pub mod conflict;
pub mod exif;
pub mod hash;
pub mod perceptual;
pub mod similarity;
pub mod tier;
