pub mod binary;
pub mod json;
