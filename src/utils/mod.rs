pub mod currency;
pub mod parse;
