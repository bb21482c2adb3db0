pub mod pinata;
pub mod rekognition;
pub mod sigv4;
