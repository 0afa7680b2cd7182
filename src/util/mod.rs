pub mod modified_utf8;
pub mod one_indexed_vec;

pub use self::one_indexed_vec::OneIndexedVec;
