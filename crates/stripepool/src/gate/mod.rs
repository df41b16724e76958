mod admission;
mod bounded;
#[cfg(test)]
mod tests;

pub use admission::*;
pub use bounded::*;
