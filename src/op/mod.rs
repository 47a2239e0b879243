//! Operators: identity, kind classification and seen-op records

mod kind;
mod record;

#[cfg(test)]
mod tests;

pub use kind::{OpKind, OpRegistry, OpType};
pub use record::{SeenNonQOpInfo, SeenQOpInfo};
