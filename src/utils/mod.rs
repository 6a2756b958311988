pub mod coordinate;
pub mod image;
pub mod tensor;
pub mod utils;
