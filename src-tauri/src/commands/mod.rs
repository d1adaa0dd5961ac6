pub use tools::*;

mod tools;
