use super::Sort;

pub type ExprResult<T> = std::result::Result<T, ExprError>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    #[error("Sort {0} was expected, but {1} was found.")]
    UnexpectedSort(Sort, Sort),

    #[error("Sort {0} and {1} should be identical.")]
    SortIntegrity(Sort, Sort),

    #[error("Extract [{high}:{low}] is out of a {size}-bit vector.")]
    InvalidExtract { high: u32, low: u32, size: usize },

    #[error("A {0}-bit vector is not made of whole bytes.")]
    NotByteSized(usize),

    #[error("Zero-width bit-vector requested.")]
    ZeroWidth,
}
