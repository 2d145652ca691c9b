mod forecast;

pub use forecast::*;
