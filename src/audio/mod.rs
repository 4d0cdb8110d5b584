pub mod blocks;
pub mod decode;
pub mod spectrum;
